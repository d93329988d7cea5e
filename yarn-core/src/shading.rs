//! Per-vertex color output.
//!
//! Colors are linear RGBA; alpha carries the evaluator's opacity so hair
//! ends fade out in every mode.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::evaluator::FiberSample;
use crate::params::FiberParams;
use crate::topology::VertexRecord;
use crate::types::FiberType;

/// Uniform fiber color, `#87ceeb`.
pub const UNIFORM_COLOR: [f32; 3] = [135.0 / 255.0, 206.0 / 255.0, 235.0 / 255.0];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorMode {
    /// Hue spread evenly over the plies.
    #[default]
    #[serde(rename = "colorByPly")]
    ByPly,
    #[serde(rename = "byFiberType")]
    ByFiberType,
    /// Brightness follows the twist phase, making each revolution visible.
    #[serde(rename = "periodFiber")]
    Period,
    #[serde(rename = "color")]
    Uniform,
}

impl ColorMode {
    pub const ALL: [ColorMode; 4] = [
        ColorMode::ByPly,
        ColorMode::ByFiberType,
        ColorMode::Period,
        ColorMode::Uniform,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Out-of-range indices read as [`ColorMode::Uniform`].
    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or(ColorMode::Uniform)
    }
}

/// Palette for [`ColorMode::ByFiberType`].
pub fn fiber_type_color(ty: FiberType) -> [f32; 3] {
    match ty {
        FiberType::Migration => [0.25, 0.55, 0.95],
        FiberType::Loop => [0.95, 0.65, 0.2],
        FiberType::Hair => [0.9, 0.25, 0.3],
    }
}

/// HSV to RGB with `h`, `s`, `v` in `[0, 1]`; `h` wraps.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let h = h.rem_euclid(1.0) * 6.0;
    let c = v * s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

/// Color of one evaluated vertex.
///
/// ### Parameters
/// - `vertex` - Metadata of the vertex.
/// - `sample` - Evaluator output for the vertex.
/// - `params` - Parameter snapshot of the pass.
pub fn shade(vertex: &VertexRecord, sample: &FiberSample, params: &FiberParams) -> [f32; 4] {
    let rgb = match params.color_mode {
        ColorMode::ByPly => {
            let hue = vertex.ply_index as f32 / params.fiber_count.max(1) as f32;
            hsv_to_rgb(hue, 0.65, 0.9)
        }
        ColorMode::ByFiberType => fiber_type_color(sample.fiber_type),
        ColorMode::Period => {
            let phase = params.twist_rate * TAU * vertex.eval_t();
            let v = 0.55 + 0.45 * phase.cos();
            UNIFORM_COLOR.map(|c| c * v)
        }
        ColorMode::Uniform => UNIFORM_COLOR,
    };
    [rgb[0], rgb[1], rgb[2], sample.opacity]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::Vec3;

    fn sample(fiber_type: FiberType, opacity: f32) -> FiberSample {
        FiberSample {
            position: Vec3::ZERO,
            radius: 0.0,
            opacity,
            fiber_type,
        }
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]);
        let green = hsv_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert_abs_diff_eq!(green[1], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(green[0], 0.0, epsilon = 1e-5);
        assert_eq!(hsv_to_rgb(0.5, 0.0, 0.4), [0.4, 0.4, 0.4]);
    }

    #[test]
    fn alpha_is_opacity() {
        let params = FiberParams::default();
        let color = shade(&VertexRecord::default(), &sample(FiberType::Hair, 0.35), &params);
        assert_eq!(color[3], 0.35);
    }

    #[test]
    fn modes_select_their_palette() {
        let mut params = FiberParams {
            color_mode: ColorMode::Uniform,
            ..FiberParams::default()
        };
        let vertex = VertexRecord::default();
        let s = sample(FiberType::Loop, 1.0);
        assert_eq!(shade(&vertex, &s, &params)[..3], UNIFORM_COLOR);

        params.color_mode = ColorMode::ByFiberType;
        assert_eq!(shade(&vertex, &s, &params)[..3], fiber_type_color(FiberType::Loop));

        params.color_mode = ColorMode::ByPly;
        let first = shade(&vertex, &s, &params);
        let other = VertexRecord {
            ply_index: 3,
            ..VertexRecord::default()
        };
        assert_ne!(first, shade(&other, &s, &params));
    }

    #[test]
    fn names_match_serialized_form() {
        assert_eq!(serde_json::to_string(&ColorMode::Period).unwrap(), "\"periodFiber\"");
        assert_eq!(ColorMode::from_index(7), ColorMode::Uniform);
        for mode in ColorMode::ALL {
            assert_eq!(ColorMode::from_index(mode.index()), mode);
        }
    }
}
