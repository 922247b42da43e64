use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::{Batch, Fix, RouteID, TripID, VehicleName};

// These mirror the JSON form of a GTFS-rt FeedMessage, so field names follow protobuf's
// JSON mapping: camelCase, with 64-bit integers sometimes rendered as strings.

#[derive(Deserialize)]
struct FeedEntity {
    vehicle: Option<VehiclePosition>,
}

#[derive(Deserialize)]
struct VehiclePosition {
    trip: Option<TripDescriptor>,
    vehicle: Option<VehicleDescriptor>,
    position: Option<Position>,
    timestamp: Option<EpochSeconds>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TripDescriptor {
    route_id: Option<String>,
    trip_id: Option<String>,
}

#[derive(Deserialize)]
struct VehicleDescriptor {
    id: Option<String>,
}

#[derive(Deserialize)]
struct Position {
    latitude: f64,
    longitude: f64,
    speed: Option<f64>,
    bearing: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EpochSeconds {
    Number(i64),
    Text(String),
}

impl EpochSeconds {
    fn value(&self) -> Option<i64> {
        match self {
            EpochSeconds::Number(x) => Some(*x),
            EpochSeconds::Text(x) => x.parse().ok(),
        }
    }
}

pub fn parse(value: &Value) -> Result<Batch> {
    let entities = match value.get("entity").and_then(|x| x.as_array()) {
        Some(x) => x,
        None => bail!("\"entity\" isn't an array"),
    };

    let mut batch = Batch {
        fixes: Vec::new(),
        routes: Vec::new(),
        skipped_records: 0,
    };
    for entity in entities {
        match fix_from_entity(entity) {
            Ok(fix) => batch.fixes.push(fix),
            Err(err) => {
                warn!("Skipping vehicle report: {}", err);
                batch.skipped_records += 1;
            }
        }
    }
    Ok(batch)
}

fn fix_from_entity(entity: &Value) -> Result<Fix> {
    let entity: FeedEntity = serde_json::from_value(entity.clone())?;
    let veh = match entity.vehicle {
        Some(x) => x,
        None => bail!("entity has no vehicle"),
    };
    let trip = veh.trip.ok_or_else(|| anyhow!("no trip descriptor"))?;
    let position = veh.position.ok_or_else(|| anyhow!("no position"))?;
    let timestamp = veh
        .timestamp
        .and_then(|t| t.value())
        .ok_or_else(|| anyhow!("no usable timestamp"))?;
    if !crate::valid_position(position.latitude, position.longitude) {
        bail!(
            "position ({}, {}) is out of range",
            position.latitude,
            position.longitude
        );
    }

    Ok(Fix {
        vehicle: VehicleName(
            veh.vehicle
                .and_then(|v| v.id)
                .ok_or_else(|| anyhow!("no vehicle id"))?,
        ),
        trip: TripID(trip.trip_id.ok_or_else(|| anyhow!("no tripId"))?),
        route: RouteID(trip.route_id.ok_or_else(|| anyhow!("no routeId"))?),
        lon: position.longitude,
        lat: position.latitude,
        speed: position.speed,
        heading: position.bearing,
        timestamp,
    })
}
