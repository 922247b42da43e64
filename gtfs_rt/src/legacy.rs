use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::{Batch, Fix, RouteID, RouteInfo, TripID, VehicleName};

// The older scraper hit a JSON API instead of the GTFS-rt feed: a top-level array of
// route objects, each carrying its current vehicles inline.

#[derive(Deserialize)]
struct LegacyRoute {
    #[serde(rename = "RouteId")]
    route_id: IdValue,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(default)]
    vehicles: Vec<Value>,
}

#[derive(Deserialize)]
struct LegacyVehicle {
    #[serde(rename = "CurrentTripId")]
    trip_id: IdValue,
    #[serde(rename = "VehicleId")]
    vehicle_id: IdValue,
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
    #[serde(rename = "Heading")]
    heading: Option<f64>,
    #[serde(rename = "TimeLastReported")]
    time_last_reported: String,
}

/// Ids in this feed are sometimes numbers, sometimes strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(i64),
    Text(String),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Number(x) => x.to_string(),
            IdValue::Text(x) => x,
        }
    }
}

pub fn parse(value: &Value) -> Result<Batch> {
    let routes = match value.as_array() {
        Some(x) => x,
        None => bail!("not an array of routes"),
    };

    let mut batch = Batch {
        fixes: Vec::new(),
        routes: Vec::new(),
        skipped_records: 0,
    };
    for route in routes {
        let route: LegacyRoute = match serde_json::from_value(route.clone()) {
            Ok(x) => x,
            Err(err) => {
                warn!("Skipping route object: {}", err);
                batch.skipped_records += 1;
                continue;
            }
        };
        let route_id = RouteID(route.route_id.into_string());
        batch.routes.push(RouteInfo {
            id: route_id.clone(),
            name: route.name,
            description: route.description,
        });

        for vehicle in route.vehicles {
            match fix_from_vehicle(&route_id, vehicle) {
                Ok(fix) => batch.fixes.push(fix),
                Err(err) => {
                    warn!("Skipping vehicle on route {:?}: {}", route_id, err);
                    batch.skipped_records += 1;
                }
            }
        }
    }
    Ok(batch)
}

fn fix_from_vehicle(route_id: &RouteID, value: Value) -> Result<Fix> {
    let rec: LegacyVehicle = serde_json::from_value(value)?;
    if !crate::valid_position(rec.latitude, rec.longitude) {
        bail!(
            "position ({}, {}) is out of range",
            rec.latitude,
            rec.longitude
        );
    }

    // No zone marker in the feed; treat it as UTC
    let datetime = NaiveDateTime::parse_from_str(&rec.time_last_reported, "%Y-%m-%dT%H:%M:%S")?;
    let timestamp = datetime.and_utc().timestamp();

    Ok(Fix {
        vehicle: VehicleName(rec.vehicle_id.into_string()),
        trip: TripID(rec.trip_id.into_string()),
        route: route_id.clone(),
        lon: rec.longitude,
        lat: rec.latitude,
        speed: None,
        heading: rec.heading,
        timestamp,
    })
}
