//! Assigns a [`FiberType`] to every ply.
//!
//! Two policies exist:
//! - [`ClassifierPolicy::ByRatio`]: 70 % migration, 20 % loop, 10 % hair,
//!   decided by `ply / total`.
//! - [`ClassifierPolicy::Random`]: 50 % / 30 % / 20 % from a uniform draw.
//!
//! Types are drawn once per rebuild and baked into vertex metadata.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::types::FiberType;

/// Ratio below which a ply migrates.
pub const RATIO_LOOP_START: f32 = 0.7;
/// Ratio from which a ply is hair.
pub const RATIO_HAIR_START: f32 = 0.9;

/// Uniform draw below which a ply migrates.
pub const DRAW_LOOP_START: f32 = 0.5;
/// Uniform draw from which a ply is hair.
pub const DRAW_HAIR_START: f32 = 0.8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierPolicy {
    #[default]
    ByRatio,
    Random,
}

/// Classifies a ply ratio `ply / total`.
#[inline]
pub fn classify_ratio(ratio: f32) -> FiberType {
    if ratio < RATIO_LOOP_START {
        FiberType::Migration
    } else if ratio < RATIO_HAIR_START {
        FiberType::Loop
    } else {
        FiberType::Hair
    }
}

/// Deterministic type of `ply` among `total` plies.
///
/// The ratio is computed in `f32` exactly as the vertex evaluator does, so
/// CPU and per-vertex classification agree on the boundaries.
#[inline]
pub fn fiber_type_for_ply(ply: u32, total: u32) -> FiberType {
    classify_ratio(ply as f32 / total.max(1) as f32)
}

/// Classifies a uniform draw in `[0, 1)`.
#[inline]
pub fn classify_draw(u: f32) -> FiberType {
    if u < DRAW_LOOP_START {
        FiberType::Migration
    } else if u < DRAW_HAIR_START {
        FiberType::Loop
    } else {
        FiberType::Hair
    }
}

/// Draws one type per ply from `rng`.
pub fn draw_fiber_types(count: u32, rng: &mut impl Rng) -> Vec<FiberType> {
    (0..count).map(|_| classify_draw(rng.random::<f32>())).collect()
}

/// Types for all `count` plies under `policy`.
///
/// ### Parameters
/// - `policy` - Selection policy.
/// - `count` - Number of plies.
/// - `seed` - For [`ClassifierPolicy::Random`]: `Some` mixes the seed with
///   `count` so identical rebuilds reproduce identical types; `None` uses
///   the thread RNG and is intentionally non-reproducible.
pub fn assign_fiber_types(policy: ClassifierPolicy, count: u32, seed: Option<u64>) -> Vec<FiberType> {
    match policy {
        ClassifierPolicy::ByRatio => (0..count).map(|ply| fiber_type_for_ply(ply, count)).collect(),
        ClassifierPolicy::Random => match seed {
            Some(seed) => {
                let mixed = seed ^ u64::from(count).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                draw_fiber_types(count, &mut StdRng::seed_from_u64(mixed))
            }
            None => draw_fiber_types(count, &mut rand::rng()),
        },
    }
}
