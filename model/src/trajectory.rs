use std::collections::BTreeMap;

use anyhow::Result;
use geo_types::Coord;
use serde::{Deserialize, Serialize};

use crate::{Fix, RouteID, TripID, VehicleName};

/// Below this many fixes there isn't enough signal to interpolate anything meaningful.
const MIN_FIXES: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrajectoryID {
    pub vehicle: VehicleName,
    pub trip: TripID,
}

/// The ordered fixes of one (vehicle, trip) pair over the run's window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: TrajectoryID,
    pub route: RouteID,
    // (lon/lat, epoch seconds), strictly increasing in time
    inner: Vec<(Coord, i64)>,
}

/// A resampled position. The timestamp is synthetic, not an observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedPoint {
    pub pos: Coord,
    pub time: f64,
}

impl Trajectory {
    pub fn new(id: TrajectoryID, route: RouteID, raw: Vec<(Coord, i64)>) -> Result<Self> {
        for pair in raw.windows(2) {
            if pair[0].1 >= pair[1].1 {
                bail!(
                    "Trajectory input out-of-order: {} then {}",
                    pair[0].1,
                    pair[1].1
                );
            }
        }
        if raw.len() < MIN_FIXES {
            bail!("Trajectory only has {} points", raw.len());
        }
        Ok(Self { id, route, inner: raw })
    }

    pub fn start_time(&self) -> i64 {
        self.inner[0].1
    }

    pub fn end_time(&self) -> i64 {
        self.inner[self.inner.len() - 1].1
    }

    pub fn points(&self) -> &[(Coord, i64)] {
        &self.inner
    }

    /// Resamples onto a fixed time grid. For each consecutive pair of fixes spanning
    /// `delta` seconds, `ceil(delta / resolution) - 1` evenly spaced points land strictly
    /// between them; the observed endpoints themselves are never emitted. Interpolation is
    /// planar on (lon, lat) rather than geodesic, which is fine across a single metro
    /// service area.
    pub fn resample(&self, resolution_secs: i64) -> Vec<TimedPoint> {
        if resolution_secs <= 0 {
            warn!("Resampling needs a positive resolution, got {}", resolution_secs);
            return Vec::new();
        }
        let mut result = Vec::new();
        for pair in self.inner.windows(2) {
            let (from, t1) = pair[0];
            let (to, t2) = pair[1];
            let delta = t2 - t1;
            let break_count = (delta as f64 / resolution_secs as f64).ceil() as i64;
            if break_count <= 0 {
                continue;
            }
            let step = delta as f64 / break_count as f64;
            for i in 1..break_count {
                let pct = i as f64 / break_count as f64;
                result.push(TimedPoint {
                    pos: Coord {
                        x: from.x + pct * (to.x - from.x),
                        y: from.y + pct * (to.y - from.y),
                    },
                    time: t1 as f64 + step * i as f64,
                });
            }
        }
        result
    }
}

/// Partitions deduplicated fixes into one trajectory per (vehicle, trip) pair, sorted by
/// time. Groups with fewer than 4 fixes are dropped; that's admission policy, not an
/// error.
pub fn group_trajectories(fixes: &[Fix]) -> BTreeMap<TrajectoryID, Trajectory> {
    let mut grouped: BTreeMap<TrajectoryID, (RouteID, Vec<(Coord, i64)>)> = BTreeMap::new();
    for fix in fixes {
        let id = TrajectoryID {
            vehicle: fix.vehicle.clone(),
            trip: fix.trip.clone(),
        };
        let point = (
            Coord {
                x: fix.lon,
                y: fix.lat,
            },
            fix.timestamp,
        );
        match grouped.get_mut(&id) {
            Some((route, points)) => {
                if *route != fix.route {
                    warn!(
                        "{:?} reports conflicting routes {:?} and {:?}; keeping the first",
                        id, route, fix.route
                    );
                }
                points.push(point);
            }
            None => {
                grouped.insert(id, (fix.route.clone(), vec![point]));
            }
        }
    }

    let mut result = BTreeMap::new();
    for (id, (route, mut raw)) in grouped {
        raw.sort_by_key(|(_, t)| *t);
        if raw.len() < MIN_FIXES {
            debug!("Dropping {:?}: only {} fixes", id, raw.len());
            continue;
        }
        match Trajectory::new(id.clone(), route, raw) {
            Ok(trajectory) => {
                result.insert(id, trajectory);
            }
            Err(err) => {
                warn!("Dropping {:?}: {}", id, err);
            }
        }
    }
    result
}
