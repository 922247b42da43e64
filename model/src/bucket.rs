use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::Result;
use geo_types::{Coord, LineString, Point};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde::{Deserialize, Serialize};

use crate::colors::{color_key, generate_color_lookup};
use crate::{Model, Options, TimedPoint, Trajectory};

/// Where the first window's lower edge sits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum WindowOrigin {
    /// Aligned to the earliest observed timestamp
    FirstObservation,
    /// A fixed epoch-seconds origin, for calendar-aligned output
    At(i64),
}

/// One LineString feature per trajectory, covering the whole window of data.
pub fn whole_day_collection(model: &Model, options: &Options) -> FeatureCollection {
    let colors = lookup_for(model, options);

    let mut features = Vec::new();
    for trajectory in model.trajectories.values() {
        let points = trajectory.resample(options.resolution_secs);
        if points.is_empty() {
            continue;
        }
        let line: LineString = points
            .iter()
            .map(|pt| Coord {
                x: round5(pt.pos.x),
                y: round5(pt.pos.y),
            })
            .collect();
        features.push(feature(
            trajectory,
            &colors[&color_key(trajectory, options.group_by)],
            geojson::Geometry::new(geojson::Value::from(&line)),
        ));
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Snapshot-style output: fixed-width windows over the run's timeframe, each holding the
/// latest known position of every trajectory that moved since the previous window. A
/// position is reported at most once; a trajectory with nothing new contributes nothing
/// to that window.
pub fn windowed_collections(model: &Model, options: &Options) -> Vec<(i64, FeatureCollection)> {
    if options.window_secs <= 0 {
        warn!("Windows need a positive width, got {}", options.window_secs);
        return Vec::new();
    }
    let (start, end) = match model.timeframe() {
        Some(x) => x,
        None => return Vec::new(),
    };
    let origin = match options.origin {
        WindowOrigin::FirstObservation => start,
        WindowOrigin::At(t) => t,
    };
    let colors = lookup_for(model, options);

    // Resample everything up front; the cursor tracks what's been reported so far
    let mut resampled: Vec<(&Trajectory, Vec<TimedPoint>, usize)> = model
        .trajectories
        .values()
        .map(|t| (t, t.resample(options.resolution_secs), 0))
        .collect();

    let mut result = Vec::new();
    let mut edge = origin;
    while edge <= end {
        let mut features = Vec::new();
        for (trajectory, points, cursor) in &mut resampled {
            let qualifying = points[*cursor..]
                .iter()
                .take_while(|pt| pt.time <= edge as f64)
                .count();
            if qualifying == 0 {
                continue;
            }
            let pt = &points[*cursor + qualifying - 1];
            *cursor += qualifying;

            let point = Point::new(round5(pt.pos.x), round5(pt.pos.y));
            features.push(feature(
                trajectory,
                &colors[&color_key(trajectory, options.group_by)],
                geojson::Geometry::new(geojson::Value::from(&point)),
            ));
        }

        let mut foreign = JsonObject::new();
        foreign.insert("window_start".to_string(), edge.into());
        result.push((
            edge,
            FeatureCollection {
                bbox: None,
                features,
                foreign_members: Some(foreign),
            },
        ));
        edge += options.window_secs;
    }
    result
}

/// Writes the whole-day FeatureCollection as one GeoJSON document. Failing to write the
/// output is the one fatal error in the pipeline.
pub fn write_whole_day(model: &Model, options: &Options, path: &Path) -> Result<()> {
    let collection = whole_day_collection(model, options);
    let file = File::create(path)?;
    serde_json::to_writer(file, &GeoJson::from(collection))?;
    Ok(())
}

/// Writes the windowed FeatureCollections as one JSON array, ascending by window start.
pub fn write_windowed(model: &Model, options: &Options, path: &Path) -> Result<()> {
    let collections: Vec<FeatureCollection> = windowed_collections(model, options)
        .into_iter()
        .map(|(_, collection)| collection)
        .collect();
    let file = File::create(path)?;
    serde_json::to_writer(file, &collections)?;
    Ok(())
}

fn lookup_for(model: &Model, options: &Options) -> BTreeMap<String, String> {
    generate_color_lookup(
        model
            .trajectories
            .values()
            .map(|t| color_key(t, options.group_by)),
        options.seed,
    )
}

fn feature(trajectory: &Trajectory, color: &str, geometry: geojson::Geometry) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("route_id".to_string(), trajectory.route.0.clone().into());
    properties.insert("trip_id".to_string(), trajectory.id.trip.0.clone().into());
    properties.insert(
        "vehicle_id".to_string(),
        trajectory.id.vehicle.0.clone().into(),
    );
    properties.insert("color".to_string(), color.into());
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

// Rounding only happens at serialization, never during interpolation.
fn round5(x: f64) -> f64 {
    (x * 1e5).round() / 1e5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fix, model_from_fixes};
    use crate::{Fix, GroupBy};

    fn options() -> Options {
        Options {
            seed: Some(42),
            ..Options::default()
        }
    }

    fn walk(vehicle: &str, trip: &str, route: &str, start: i64) -> Vec<Fix> {
        (0..4)
            .map(|i| {
                fix(
                    vehicle,
                    trip,
                    route,
                    -122.25 + 0.01 * i as f64,
                    37.84,
                    start + 60 * i,
                )
            })
            .collect()
    }

    #[test]
    fn whole_day_emits_one_linestring_per_trajectory() {
        let mut fixes = walk("v1", "t1", "r1", 0);
        fixes.extend(walk("v2", "t2", "r2", 0));
        let model = model_from_fixes(fixes);

        let collection = whole_day_collection(&model, &options());
        assert_eq!(collection.features.len(), 2);

        let feature = &collection.features[0];
        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["route_id"], "r1");
        assert_eq!(properties["trip_id"], "t1");
        assert_eq!(properties["vehicle_id"], "v1");
        assert!(properties["color"].as_str().unwrap().starts_with('#'));

        match &feature.geometry.as_ref().unwrap().value {
            geojson::Value::LineString(coords) => {
                // 60s gaps at 10s resolution: 5 intermediates per gap, 3 gaps
                assert_eq!(coords.len(), 15);
                // First intermediate of the first gap, rounded to 5 decimal places
                assert_eq!(coords[0], vec![-122.24833, 37.84]);
            }
            x => panic!("not a LineString: {:?}", x),
        }
    }

    #[test]
    fn same_route_means_same_color() {
        let mut fixes = walk("v1", "t1", "r1", 0);
        fixes.extend(walk("v2", "t2", "r1", 0));
        let model = model_from_fixes(fixes);

        let collection = whole_day_collection(&model, &options());
        let color_of = |i: usize| {
            collection.features[i].properties.as_ref().unwrap()["color"]
                .as_str()
                .unwrap()
                .to_string()
        };
        assert_eq!(color_of(0), color_of(1));

        // Grouped by vehicle instead, they differ
        let by_vehicle = whole_day_collection(
            &model,
            &Options {
                group_by: GroupBy::Vehicle,
                ..options()
            },
        );
        let color_of = |i: usize| {
            by_vehicle.features[i].properties.as_ref().unwrap()["color"]
                .as_str()
                .unwrap()
                .to_string()
        };
        assert_ne!(color_of(0), color_of(1));
    }

    #[test]
    fn windows_ascend_and_report_each_position_once() {
        // One trajectory spanning 0..180s, windowed every 60s
        let fixes = walk("v1", "t1", "r1", 0);
        let model = model_from_fixes(fixes);
        let options = Options {
            window_secs: 60,
            ..options()
        };

        let windows = windowed_collections(&model, &options);
        let starts: Vec<i64> = windows.iter().map(|(start, _)| *start).collect();
        assert_eq!(starts, vec![0, 60, 120, 180]);

        // Nothing has happened yet at the very first edge
        assert!(windows[0].1.features.is_empty());
        // Each later window reports exactly this trajectory's latest position
        for (_, collection) in &windows[1..] {
            assert_eq!(collection.features.len(), 1);
            match &collection.features[0].geometry.as_ref().unwrap().value {
                geojson::Value::Point(_) => {}
                x => panic!("not a Point: {:?}", x),
            }
        }

        // The reported positions are distinct; no point is ever repeated
        let mut positions = Vec::new();
        for (_, collection) in &windows {
            for feature in &collection.features {
                if let geojson::Value::Point(coords) = &feature.geometry.as_ref().unwrap().value {
                    positions.push(coords.clone());
                }
            }
        }
        let total = positions.len();
        positions.dedup();
        assert_eq!(positions.len(), total);

        assert_eq!(
            windows[1].1.foreign_members.as_ref().unwrap()["window_start"],
            60
        );
    }

    #[test]
    fn quiet_trajectory_contributes_nothing_to_a_window() {
        // v2 only moves at the start; v1 keeps going
        let mut fixes = walk("v1", "t1", "r1", 0);
        fixes.extend((0..4).map(|i| fix("v2", "t2", "r2", 0.0, 0.0, 15 * i)));
        let model = model_from_fixes(fixes);
        let options = Options {
            window_secs: 60,
            ..options()
        };

        let windows = windowed_collections(&model, &options);
        // v2's whole 45s of signal is consumed by the t=60 window; after that only v1
        // appears
        assert_eq!(windows[1].1.features.len(), 2);
        for (_, collection) in &windows[2..] {
            assert_eq!(collection.features.len(), 1);
            assert_eq!(
                collection.features[0].properties.as_ref().unwrap()["vehicle_id"],
                "v1"
            );
        }
    }

    #[test]
    fn fixed_origin_shifts_the_grid() {
        let fixes = walk("v1", "t1", "r1", 100);
        let model = model_from_fixes(fixes);
        let options = Options {
            window_secs: 60,
            origin: WindowOrigin::At(90),
            ..options()
        };
        let starts: Vec<i64> = windowed_collections(&model, &options)
            .iter()
            .map(|(start, _)| *start)
            .collect();
        assert_eq!(starts, vec![90, 150, 210, 270]);
    }

    #[test]
    fn empty_model_writes_empty_collections() {
        let model = model_from_fixes(Vec::new());
        assert!(windowed_collections(&model, &options()).is_empty());
        assert!(whole_day_collection(&model, &options()).features.is_empty());
    }
}
