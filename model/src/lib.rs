#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod bucket;
mod colors;
mod dedup;
mod export;
mod trajectory;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use gtfs_rt::{Diagnostics, Fix, RouteID, RouteInfo, Snapshots, TripID, VehicleName};

pub use self::bucket::{
    whole_day_collection, windowed_collections, write_whole_day, write_windowed, WindowOrigin,
};
pub use self::colors::{color_key, generate_color_lookup};
pub use self::dedup::dedupe_fixes;
pub use self::trajectory::{group_trajectories, TimedPoint, Trajectory, TrajectoryID};

/// Which identifier output features are keyed on for color assignment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GroupBy {
    Route,
    Vehicle,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Options {
    /// Spacing of the resampled time grid, in seconds
    pub resolution_secs: i64,
    /// Width of each output window, in seconds
    pub window_secs: i64,
    pub group_by: GroupBy,
    /// Pins down the color generator. Mostly for tests; colors are otherwise drawn fresh
    /// each run.
    pub seed: Option<u64>,
    pub origin: WindowOrigin,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            resolution_secs: 10,
            window_secs: 600,
            group_by: GroupBy::Route,
            seed: None,
            origin: WindowOrigin::FirstObservation,
        }
    }
}

/// One bounded window of position data, ready for export. Every stage consuming this
/// produces a new derived collection; nothing here is mutated after assembly.
pub struct Model {
    /// Deduplicated fixes in stable input order, including ones belonging to trajectories
    /// that didn't survive admission
    pub fixes: Vec<Fix>,
    pub trajectories: BTreeMap<TrajectoryID, Trajectory>,
    /// Route metadata, when the legacy feed supplied any
    pub routes: BTreeMap<RouteID, RouteInfo>,
    pub diagnostics: Diagnostics,
}

impl Model {
    pub fn from_snapshots(snapshots: Snapshots) -> Self {
        let fixes = dedup::dedupe_fixes(snapshots.fixes);
        let trajectories = trajectory::group_trajectories(&fixes);
        info!(
            "{} fixes after dedup, {} trajectories admitted",
            fixes.len(),
            trajectories.len()
        );
        Self {
            fixes,
            trajectories,
            routes: snapshots.routes,
            diagnostics: snapshots.diagnostics,
        }
    }

    pub fn load_files(paths: &[PathBuf]) -> Self {
        Self::from_snapshots(gtfs_rt::load_files(paths))
    }

    pub fn load_dir(path: &Path) -> Result<Self> {
        Ok(Self::from_snapshots(gtfs_rt::load_dir(path)?))
    }

    /// Earliest and latest observed timestamp across admitted trajectories
    pub fn timeframe(&self) -> Option<(i64, i64)> {
        let start = self.trajectories.values().map(|t| t.start_time()).min()?;
        let end = self.trajectories.values().map(|t| t.end_time()).max()?;
        Some((start, end))
    }
}
