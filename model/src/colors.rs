use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{GroupBy, Trajectory};

/// The identifier a trajectory's display color is keyed on.
pub fn color_key(trajectory: &Trajectory, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Route => trajectory.route.0.clone(),
        GroupBy::Vehicle => trajectory.id.vehicle.0.clone(),
    }
}

/// One bright `#rrggbb` color per key. Downstream rendering correlates color to identity,
/// so the same key always maps to the same color within a run and no two keys share one.
/// Colors are random across runs unless a seed pins them down.
pub fn generate_color_lookup<I: IntoIterator<Item = String>>(
    keys: I,
    seed: Option<u64>,
) -> BTreeMap<String, String> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut used = BTreeSet::new();
    let mut lookup = BTreeMap::new();
    for key in keys {
        if lookup.contains_key(&key) {
            continue;
        }
        let mut color = rand_color(&mut rng);
        while !used.insert(color.clone()) {
            color = rand_color(&mut rng);
        }
        lookup.insert(key, color);
    }
    lookup
}

fn rand_color(rng: &mut StdRng) -> String {
    // Hue is free; saturation and lightness stay well clear of black and white
    let h: f64 = rng.random();
    let s = 0.5 + rng.random::<f64>() / 2.0;
    let l = 0.4 + rng.random::<f64>() / 5.0;
    let (r, g, b) = hsl_to_rgb(h, s, l);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Standard HSL to RGB, all inputs in [0, 1).
fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h * 6.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as usize {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (x, 0.0, c),
        4 => (0.0, x, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    (
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    )
}
