use anyhow::Result;
use chrono::DateTime;
use serde::Serialize;

use crate::Model;

// The daily wrap-up: two CSVs summarizing a day of scraping, one of route metadata and
// one of every deduplicated position report.

impl Model {
    /// One row per discrete route. Only the legacy feed carries metadata, so this may be
    /// empty for GTFS-rt corpora.
    pub fn export_routes_csv(&self) -> Result<String> {
        let mut out = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut out);
            for info in self.routes.values() {
                writer.serialize(RouteRow {
                    id: &info.id.0,
                    name: info.name.as_deref().unwrap_or(""),
                    description: info.description.as_deref().unwrap_or(""),
                })?;
            }
            writer.flush()?;
        }
        let out = String::from_utf8(out)?;
        Ok(out)
    }

    /// One row per deduplicated fix, including fixes from trajectories that didn't
    /// survive admission.
    pub fn export_fixes_csv(&self) -> Result<String> {
        let mut out = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut out);
            for fix in &self.fixes {
                let time = match DateTime::from_timestamp(fix.timestamp, 0) {
                    Some(x) => x.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    None => bail!("timestamp {} is out of range", fix.timestamp),
                };
                writer.serialize(FixRow {
                    vehicle: &fix.vehicle.0,
                    trip: &fix.trip.0,
                    route: &fix.route.0,
                    lat: fix.lat,
                    lon: fix.lon,
                    heading: fix.heading,
                    time,
                })?;
            }
            writer.flush()?;
        }
        let out = String::from_utf8(out)?;
        Ok(out)
    }
}

#[derive(Serialize)]
struct RouteRow<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct FixRow<'a> {
    vehicle: &'a str,
    trip: &'a str,
    route: &'a str,
    lat: f64,
    lon: f64,
    heading: Option<f64>,
    time: String,
}
