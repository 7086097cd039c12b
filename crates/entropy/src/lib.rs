//! Entropy engine: Henon-map sample generation, numeric projection,
//! weighted-average fusion, and proximity-based next-leader selection.
//!
//! Every function here is pure (generation aside) and synchronous; the round
//! coordinator composes them. The numeric semantics are pinned:
//!
//! - a sample is the string `"{x:.6}_{y:.6}"` after ten Henon iterations,
//! - its projection is `SHA256(sample) mod 2^32` over the UTF-8 bytes,
//! - the aggregate is the weighted mean of projections, formatted `"{:.6}"`,
//! - the next leader is the contributor minimizing the squared distance of
//!   its projection to the aggregate's projection, ties going to the
//!   lexicographically smallest node id.

use chaosledger_types::{sha256_digest, NodeId};
use rand::Rng;
use std::collections::BTreeMap;

/// Henon map parameter a.
pub const HENON_A: f64 = 1.4;

/// Henon map parameter b.
pub const HENON_B: f64 = 0.3;

/// Iterations applied to the initial conditions.
pub const HENON_ITERATIONS: u32 = 10;

/// Exponent of the Minkowski proximity used for leader selection.
pub const PROXIMITY_EXPONENT: i32 = 2;

/// Iterate the Henon map `(x, y) <- (1 - a*x^2 + y, b*x)` from the given
/// initial conditions and format the final state as a sample string.
pub fn sample_from(x0: f64, y0: f64) -> String {
    let (mut x, mut y) = (x0, y0);
    for _ in 0..HENON_ITERATIONS {
        let next_x = 1.0 - HENON_A * x * x + y;
        y = HENON_B * x;
        x = next_x;
    }
    format!("{x:.6}_{y:.6}")
}

/// Generate a fresh entropy sample from uniform initial conditions.
///
/// Initial conditions outside the attractor's basin diverge; those draws are
/// rejected and resampled, so the returned sample is always well-formed.
pub fn generate_sample() -> String {
    let mut rng = rand::thread_rng();
    loop {
        let sample = sample_from(rng.gen::<f64>(), rng.gen::<f64>());
        if is_well_formed(&sample) {
            return sample;
        }
    }
}

/// Whether a sample parses as two finite reals within the Henon bounds
/// `-1.5 <= x <= 1.5`, `-0.5 <= y <= 0.5`.
pub fn is_well_formed(sample: &str) -> bool {
    let Some((x_part, y_part)) = sample.split_once('_') else {
        return false;
    };
    let (Ok(x), Ok(y)) = (x_part.parse::<f64>(), y_part.parse::<f64>()) else {
        return false;
    };
    x.is_finite() && y.is_finite() && (-1.5..=1.5).contains(&x) && (-0.5..=0.5).contains(&y)
}

/// Project a sample (or aggregate) string to `SHA256(s) mod 2^32`.
///
/// Equivalent to the last four digest bytes read big-endian.
pub fn to_numeric(value: &str) -> u32 {
    let digest = sha256_digest(value);
    u32::from_be_bytes([digest[28], digest[29], digest[30], digest[31]])
}

/// Weighted-average fusion of contributions.
///
/// Missing weights default to 1. A zero total weight yields 0. Iteration is
/// over a `BTreeMap`, but the sum is order-independent by construction.
pub fn fuse(
    contributions: &BTreeMap<NodeId, String>,
    weights: Option<&BTreeMap<NodeId, f64>>,
) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for (node_id, sample) in contributions {
        let weight = weights
            .and_then(|w| w.get(node_id).copied())
            .unwrap_or(1.0);
        weighted_sum += f64::from(to_numeric(sample)) * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    }
}

/// Format an aggregate to the six-decimal string used on the wire and as the
/// block `entropy` field.
pub fn format_aggregate(aggregate: f64) -> String {
    format!("{aggregate:.6}")
}

/// Squared distance between two projections.
pub fn proximity(sample_value: u32, aggregate_value: u32) -> f64 {
    let diff = (f64::from(sample_value) - f64::from(aggregate_value)).abs();
    diff.powi(PROXIMITY_EXPONENT)
}

/// The contributor whose projection is closest to the aggregate's.
///
/// Ties resolve to the lexicographically smallest node id; `None` when there
/// are no contributions.
pub fn closest_contributor(
    contributions: &BTreeMap<NodeId, String>,
    aggregate: &str,
) -> Option<NodeId> {
    let aggregate_value = to_numeric(aggregate);
    let mut best: Option<(NodeId, f64)> = None;

    for (node_id, sample) in contributions {
        let distance = proximity(to_numeric(sample), aggregate_value);
        // BTreeMap iterates in ascending id order, so strict < keeps the
        // lexicographically smallest id on ties.
        match &best {
            Some((_, best_distance)) if distance >= *best_distance => {}
            _ => best = Some((node_id.clone(), distance)),
        }
    }

    best.map(|(node_id, _)| node_id)
}
