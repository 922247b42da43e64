#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod legacy;
mod snapshot;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use zip::ZipArchive;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleName(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TripID(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteID(pub String);

/// A single observed vehicle position report, normalized from either wire format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub vehicle: VehicleName,
    pub trip: TripID,
    pub route: RouteID,
    pub lon: f64,
    pub lat: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    /// Epoch seconds
    pub timestamp: i64,
}

/// Route metadata, only carried by the legacy route-centric feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub id: RouteID,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Everything extracted from one snapshot file.
pub struct Batch {
    pub fixes: Vec<Fix>,
    pub routes: Vec<RouteInfo>,
    pub skipped_records: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub files_read: usize,
    pub files_skipped: usize,
    pub records_skipped: usize,
}

/// The merged result of loading a corpus of snapshot files.
pub struct Snapshots {
    /// In file order, unfiltered. Reports for the same moment may repeat when polling
    /// windows overlap.
    pub fixes: Vec<Fix>,
    pub routes: BTreeMap<RouteID, RouteInfo>,
    pub diagnostics: Diagnostics,
}

impl Snapshots {
    pub fn empty() -> Self {
        Self {
            fixes: Vec::new(),
            routes: BTreeMap::new(),
            diagnostics: Diagnostics::default(),
        }
    }
}

/// Parses one snapshot file's contents. Accepts either the GTFS-rt JSON shape (an object
/// with a top-level "entity" array) or the legacy route-centric shape (an array of route
/// objects) transparently.
pub fn parse_snapshot(raw: &str) -> Result<Batch> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if value.is_object() {
        if value.get("entity").is_some() {
            return snapshot::parse(&value);
        }
        bail!("JSON object has no \"entity\" array");
    }
    if value.is_array() {
        return legacy::parse(&value);
    }
    bail!("neither a GTFS-rt feed nor a legacy route list");
}

/// Reads and merges a set of snapshot files. A file that can't be read or parsed is
/// skipped and counted, never fatal.
pub fn load_files(paths: &[PathBuf]) -> Snapshots {
    let mut snapshots = Snapshots::empty();
    for path in paths {
        match fs::read_to_string(path) {
            Ok(raw) => merge_file(&mut snapshots, &path.display().to_string(), &raw),
            Err(err) => {
                warn!("Skipping {}: {}", path.display(), err);
                snapshots.diagnostics.files_skipped += 1;
            }
        }
    }
    info!(
        "Loaded {} fixes from {} files ({} files and {} records skipped)",
        snapshots.fixes.len(),
        snapshots.diagnostics.files_read,
        snapshots.diagnostics.files_skipped,
        snapshots.diagnostics.records_skipped
    );
    snapshots
}

/// Loads every .json file in a directory, in filename order. Failing to list the
/// directory at all is a configuration problem, so that's surfaced.
pub fn load_dir(path: &Path) -> Result<Snapshots> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(path)? {
        let p = entry?.path();
        if p.extension().map(|x| x == "json").unwrap_or(false) {
            paths.push(p);
        }
    }
    paths.sort();
    Ok(load_files(&paths))
}

/// Loads every .json member of a zip archive, the same way `load_dir` treats a
/// directory. A day's corpus is often archived as one zip.
pub fn load_zip<R: std::io::Read + std::io::Seek>(reader: R) -> Result<Snapshots> {
    let mut archive = ZipArchive::new(reader)?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.ends_with(".json"))
        .map(|n| n.to_string())
        .collect();
    names.sort();

    let mut snapshots = Snapshots::empty();
    for name in names {
        let mut raw = String::new();
        let result = archive
            .by_name(&name)
            .map_err(anyhow::Error::from)
            .and_then(|mut file| {
                std::io::Read::read_to_string(&mut file, &mut raw)?;
                Ok(())
            });
        match result {
            Ok(()) => merge_file(&mut snapshots, &name, &raw),
            Err(err) => {
                warn!("Skipping {}: {}", name, err);
                snapshots.diagnostics.files_skipped += 1;
            }
        }
    }
    Ok(snapshots)
}

fn merge_file(snapshots: &mut Snapshots, source: &str, raw: &str) {
    match parse_snapshot(raw) {
        Ok(batch) => {
            snapshots.diagnostics.files_read += 1;
            snapshots.diagnostics.records_skipped += batch.skipped_records;
            snapshots.fixes.extend(batch.fixes);
            // Route metadata only needs recording once per discrete route
            for info in batch.routes {
                snapshots.routes.entry(info.id.clone()).or_insert(info);
            }
        }
        Err(err) => {
            warn!("Skipping {}: {}", source, err);
            snapshots.diagnostics.files_skipped += 1;
        }
    }
}

/// The scraper names each snapshot `<epoch seconds>.json`. Counts reports per (day,
/// hour) and returns only the files belonging to the busiest hour. Files without an
/// epoch-seconds name contribute nothing.
pub fn busiest_hour(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut counts: BTreeMap<(u32, u32), usize> = BTreeMap::new();
    let mut stamped: Vec<(PathBuf, (u32, u32))> = Vec::new();
    for path in paths {
        let key = match filename_datetime(path) {
            Some(dt) => (dt.day(), dt.hour()),
            None => {
                warn!("{} isn't named <epoch seconds>.json", path.display());
                continue;
            }
        };
        *counts.entry(key).or_insert(0) += count_reports(path);
        stamped.push((path.clone(), key));
    }

    let mut peak: Option<((u32, u32), usize)> = None;
    for (key, count) in counts {
        if peak.map(|(_, best)| count > best).unwrap_or(true) {
            peak = Some((key, count));
        }
    }
    let (peak, count) = match peak {
        Some(x) => x,
        None => bail!("no files named <epoch seconds>.json"),
    };
    info!("Peak day ({}) hour ({}) count ({})", peak.0, peak.1, count);

    Ok(stamped
        .into_iter()
        .filter(|(_, key)| *key == peak)
        .map(|(path, _)| path)
        .collect())
}

fn count_reports(path: &Path) -> usize {
    let value: serde_json::Value = match fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
    {
        Some(x) => x,
        None => return 0,
    };
    // Sometimes the protobuf response has no entities at all
    if let Some(entities) = value.get("entity").and_then(|x| x.as_array()) {
        return entities.len();
    }
    if let Some(routes) = value.as_array() {
        return routes
            .iter()
            .filter_map(|r| r.get("vehicles"))
            .filter_map(|v| v.as_array())
            .map(|v| v.len())
            .sum();
    }
    0
}

fn filename_datetime(path: &Path) -> Option<DateTime<Utc>> {
    let secs: i64 = path.file_stem()?.to_str()?.parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}

pub(crate) fn valid_position(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gtfs_rt_{}_{}", name, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn entity(vehicle: &str, timestamp: i64) -> String {
        format!(
            r#"{{"vehicle": {{"trip": {{"routeId": "51B", "tripId": "t1"}}, "vehicle": {{"id": "{}"}}, "position": {{"latitude": 37.8, "longitude": -122.27}}, "timestamp": {}}}}}"#,
            vehicle, timestamp
        )
    }

    #[test]
    fn one_bad_file_doesnt_poison_the_rest() {
        let dir = scratch_dir("mixed");
        for i in 0..9 {
            let mut f = fs::File::create(dir.join(format!("160000000{}.json", i))).unwrap();
            write!(
                f,
                r#"{{"entity": [{}]}}"#,
                entity("v1", 1600000000 + i as i64)
            )
            .unwrap();
        }
        let mut f = fs::File::create(dir.join("garbage.json")).unwrap();
        write!(f, "{{not json").unwrap();

        let snapshots = load_dir(&dir).unwrap();
        assert_eq!(snapshots.fixes.len(), 9);
        assert_eq!(snapshots.diagnostics.files_read, 9);
        assert_eq!(snapshots.diagnostics.files_skipped, 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn object_without_entity_is_a_shape_error() {
        assert!(parse_snapshot(r#"{"header": {}}"#).is_err());
        assert!(parse_snapshot("42").is_err());
    }

    #[test]
    fn busiest_hour_picks_the_densest_files() {
        let dir = scratch_dir("peak");
        // Two reports at 00:00 UTC on 2020-09-13, one an hour later
        let quiet = dir.join("1599958800.json");
        let busy1 = dir.join("1599955200.json");
        let busy2 = dir.join("1599955230.json");
        for (path, n) in [(&busy1, 3i64), (&busy2, 2), (&quiet, 1)] {
            let entities = (0..n)
                .map(|i| entity("v1", 1599955200 + i))
                .collect::<Vec<_>>()
                .join(", ");
            let mut f = fs::File::create(path).unwrap();
            write!(f, r#"{{"entity": [{}]}}"#, entities).unwrap();
        }

        let mut paths = vec![quiet.clone(), busy1.clone(), busy2.clone()];
        paths.sort();
        let mut kept = busiest_hour(&paths).unwrap();
        kept.sort();
        assert_eq!(kept, vec![busy1, busy2]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn zip_matches_directory_loading() {
        let buffer = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(buffer);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file("1600000000.json", options).unwrap();
        write!(writer, r#"{{"entity": [{}]}}"#, entity("v1", 1600000000)).unwrap();
        writer.start_file("1600000030.json", options).unwrap();
        write!(writer, r#"{{"entity": [{}]}}"#, entity("v2", 1600000030)).unwrap();
        writer.start_file("readme.txt", options).unwrap();
        write!(writer, "not a snapshot").unwrap();
        let buffer = writer.finish().unwrap();

        let snapshots = load_zip(buffer).unwrap();
        assert_eq!(snapshots.fixes.len(), 2);
        assert_eq!(snapshots.diagnostics.files_read, 2);
        assert_eq!(snapshots.diagnostics.files_skipped, 0);
    }
}
