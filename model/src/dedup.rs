use std::collections::BTreeSet;

use crate::Fix;

/// Drops repeated reports of the same (vehicle, trip, timestamp), keeping the first seen.
/// Overlapping polling windows legitimately capture byte-identical reports for the same
/// real-world moment, so this happens before any grouping.
pub fn dedupe_fixes(fixes: Vec<Fix>) -> Vec<Fix> {
    let mut seen = BTreeSet::new();
    let mut result = Vec::with_capacity(fixes.len());
    for fix in fixes {
        if seen.insert((fix.vehicle.clone(), fix.trip.clone(), fix.timestamp)) {
            result.push(fix);
        }
    }
    result
}
