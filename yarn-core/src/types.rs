use serde::{Deserialize, Serialize};

/// Index of a ply inside one yarn, in `[0, fiber_count)`.
pub type PlyIndex = u32;

/// Index of a texel in a [`crate::curve_store::CurveLookupBuffer`].
///
/// Texel `i` lives at `row = i / width`, `col = i % width`.
pub type SampleIndex = u32;

/// Behavior class governing the radius and end condition of a ply.
///
/// The discriminants are the values written into vertex attribute buffers,
/// so their order is fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FiberType {
    /// Distance to the ply center varies between `radius_min` and `radius_max`.
    Migration = 0,
    /// Same law as migration with its own (optional) maximum radius.
    Loop = 1,
    /// Open ends that detach from the yarn near both curve ends.
    Hair = 2,
}

impl FiberType {
    pub const ALL: [FiberType; 3] = [FiberType::Migration, FiberType::Loop, FiberType::Hair];

    /// Raw attribute value for this type.
    #[inline]
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Decodes an attribute value. Anything past `Loop` reads as `Hair`, so a
    /// decoded value is always one of the three types.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => FiberType::Migration,
            1 => FiberType::Loop,
            _ => FiberType::Hair,
        }
    }
}

/// How plies are turned into primitives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// One line strip per ply, supersampled along the curve.
    Line,
    /// One triangulated tube of rings per ply and curve.
    #[default]
    Tube,
}

impl RenderMode {
    pub const NAMES: [&'static str; 2] = ["line", "tube"];

    pub fn index(self) -> usize {
        match self {
            RenderMode::Line => 0,
            RenderMode::Tube => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            RenderMode::Line
        } else {
            RenderMode::Tube
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fiber_type_raw_values_are_stable() {
        for ty in FiberType::ALL {
            assert_eq!(FiberType::from_raw(ty.as_raw()), ty);
        }
        assert_eq!(FiberType::Migration.as_raw(), 0);
        assert_eq!(FiberType::Hair.as_raw(), 2);
        assert_eq!(FiberType::from_raw(17), FiberType::Hair);
    }

    #[test]
    fn render_mode_index_roundtrip() {
        assert_eq!(RenderMode::from_index(RenderMode::Line.index()), RenderMode::Line);
        assert_eq!(RenderMode::from_index(RenderMode::Tube.index()), RenderMode::Tube);
    }
}
