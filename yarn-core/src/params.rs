//! The tunable parameter set and its control-panel declarations.
//!
//! [`FiberParams`] is a flat, `Copy` snapshot: the evaluator reads one
//! snapshot per pass, so a pass never sees half of an update. Every
//! parameter is declared by a [`ParamSpec`] (name, bounds, step, default)
//! and can be set independently through [`FiberParams::set`], which clamps
//! out-of-range values instead of rejecting them.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::shading::ColorMode;
use crate::topology::TopologyRequest;
use crate::types::RenderMode;

/// Identifier of one parameter in the flat namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamId {
    FiberCount,
    TwistRate,
    RadiusMin,
    RadiusMax,
    MigrationFrequency,
    EllipseCos,
    EllipseSin,
    EnableMigration,
    SeparateLoopRadius,
    LoopRadiusMax,
    HairAcceptanceThreshold,
    HairWiggleFrequency,
    HairWiggleStrength,
    HairSharpnessIn,
    HairSharpnessOut,
    CoreRadius,
    Resolution,
    RadialSegments,
    RenderMode,
    RandomFiberType,
    ColorMode,
    VisiblePly,
    AnimationPeriod,
}

/// Value of a parameter as exchanged with the control panel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    /// Index into the option list of a [`ParamKind::Choice`].
    Choice(usize),
}

/// Shape and bounds of a parameter. Bounds are inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamKind {
    Float { min: f32, max: f32, step: f32 },
    Int { min: i32, max: i32 },
    Bool,
    Choice(&'static [&'static str]),
}

/// Declaration handed to the control panel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamSpec {
    pub id: ParamId,
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamValue,
    /// Changing it requires a topology rebuild rather than a uniform update.
    pub structural: bool,
}

/// Result of [`FiberParams::set`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SetOutcome {
    Applied,
    /// The value was outside the declared bounds (or not finite) and was
    /// clamped.
    Clamped {
        requested: ParamValue,
        applied: ParamValue,
    },
    /// The value has the wrong shape for this parameter (e.g. a bool for a
    /// float); nothing was written.
    Rejected,
}

const COLOR_MODES: &[&str] = &["colorByPly", "byFiberType", "periodFiber", "color"];

const fn float(min: f32, max: f32, step: f32) -> ParamKind {
    ParamKind::Float { min, max, step }
}

impl ParamId {
    pub const ALL: [ParamId; 23] = [
        ParamId::FiberCount,
        ParamId::TwistRate,
        ParamId::RadiusMin,
        ParamId::RadiusMax,
        ParamId::MigrationFrequency,
        ParamId::EllipseCos,
        ParamId::EllipseSin,
        ParamId::EnableMigration,
        ParamId::SeparateLoopRadius,
        ParamId::LoopRadiusMax,
        ParamId::HairAcceptanceThreshold,
        ParamId::HairWiggleFrequency,
        ParamId::HairWiggleStrength,
        ParamId::HairSharpnessIn,
        ParamId::HairSharpnessOut,
        ParamId::CoreRadius,
        ParamId::Resolution,
        ParamId::RadialSegments,
        ParamId::RenderMode,
        ParamId::RandomFiberType,
        ParamId::ColorMode,
        ParamId::VisiblePly,
        ParamId::AnimationPeriod,
    ];

    pub fn spec(self) -> ParamSpec {
        use ParamValue::{Bool, Choice, Float, Int};

        let (name, kind, default, structural) = match self {
            ParamId::FiberCount => ("fiberCount", ParamKind::Int { min: 1, max: 64 }, Int(6), true),
            ParamId::TwistRate => ("fiberTwistRate", float(0.0, 50.0, 0.5), Float(1.0), false),
            ParamId::RadiusMin => ("fiberRadiusMin", float(0.001, 0.1, 0.001), Float(0.01), false),
            ParamId::RadiusMax => ("fiberRadiusMax", float(0.001, 0.1, 0.001), Float(0.03), false),
            ParamId::MigrationFrequency => {
                ("migrationFrequency", float(0.0, 30.0, 0.1), Float(4.0), false)
            }
            ParamId::EllipseCos => ("ellipseCos", float(1.0, 2.0, 0.01), Float(1.0), false),
            ParamId::EllipseSin => ("ellipseSin", float(1.0, 2.0, 0.01), Float(1.0), false),
            ParamId::EnableMigration => ("enableMigration", ParamKind::Bool, Bool(true), false),
            ParamId::SeparateLoopRadius => {
                ("separateLoopRadius", ParamKind::Bool, Bool(false), false)
            }
            ParamId::LoopRadiusMax => ("loopRadiusMax", float(0.001, 0.2, 0.001), Float(0.05), false),
            ParamId::HairAcceptanceThreshold => {
                ("hairAcceptanceThreshold", float(0.0, 5.0, 0.05), Float(0.5), false)
            }
            ParamId::HairWiggleFrequency => {
                ("hairWiggleFrequency", float(0.5, 20.0, 0.1), Float(5.0), false)
            }
            ParamId::HairWiggleStrength => {
                ("hairWiggleStrength", float(0.0, 2.0, 0.01), Float(0.7), false)
            }
            ParamId::HairSharpnessIn => ("hairSharpnessIn", float(0.0, 5.0, 0.01), Float(0.7), false),
            ParamId::HairSharpnessOut => {
                ("hairSharpnessOut", float(0.0, 5.0, 0.01), Float(0.7), false)
            }
            ParamId::CoreRadius => ("coreRadius", float(0.0, 1.0, 0.001), Float(0.005), false),
            ParamId::Resolution => ("resolution", ParamKind::Int { min: 1, max: 100 }, Int(64), true),
            ParamId::RadialSegments => {
                ("radialSegments", ParamKind::Int { min: 3, max: 64 }, Int(16), true)
            }
            ParamId::RenderMode => (
                "renderMode",
                ParamKind::Choice(&RenderMode::NAMES),
                Choice(RenderMode::Tube.index()),
                true,
            ),
            ParamId::RandomFiberType => ("enableRandomFiberType", ParamKind::Bool, Bool(true), true),
            ParamId::ColorMode => ("shaderType", ParamKind::Choice(COLOR_MODES), Choice(0), false),
            ParamId::VisiblePly => ("visiblePly", ParamKind::Int { min: -1, max: 63 }, Int(-1), false),
            ParamId::AnimationPeriod => ("animationPeriod", float(2.0, 20.0, 0.5), Float(10.0), false),
        };

        ParamSpec {
            id: self,
            name,
            kind,
            default,
            structural,
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    pub fn is_structural(self) -> bool {
        self.spec().structural
    }
}

impl ParamKind {
    /// Coerces `value` to this kind and clamps it to the bounds.
    ///
    /// Returns `None` when the shapes are incompatible, otherwise the value
    /// to store and whether it had to be changed.
    fn admit(&self, value: ParamValue) -> Option<(ParamValue, bool)> {
        match (*self, value) {
            (ParamKind::Float { min, max, .. }, ParamValue::Float(_) | ParamValue::Int(_)) => {
                let v = match value {
                    ParamValue::Float(v) => v,
                    ParamValue::Int(v) => v as f32,
                    _ => return None,
                };
                let applied = if v.is_nan() { min } else { v.clamp(min, max) };
                Some((ParamValue::Float(applied), applied != v))
            }
            (ParamKind::Int { min, max }, ParamValue::Int(v)) => {
                let applied = v.clamp(min, max);
                Some((ParamValue::Int(applied), applied != v))
            }
            (ParamKind::Int { min, max }, ParamValue::Float(v)) => {
                let rounded = if v.is_nan() { min as f32 } else { v.round() };
                let applied = rounded.clamp(min as f32, max as f32) as i32;
                Some((ParamValue::Int(applied), applied as f32 != v))
            }
            (ParamKind::Bool, ParamValue::Bool(b)) => Some((ParamValue::Bool(b), false)),
            (ParamKind::Choice(options), ParamValue::Choice(i)) => {
                let applied = i.min(options.len().saturating_sub(1));
                Some((ParamValue::Choice(applied), applied != i))
            }
            (ParamKind::Choice(options), ParamValue::Int(i)) => {
                let applied = (i.max(0) as usize).min(options.len().saturating_sub(1));
                Some((ParamValue::Choice(applied), applied as i64 != i64::from(i)))
            }
            _ => None,
        }
    }
}

impl ParamValue {
    fn float(self) -> f32 {
        match self {
            ParamValue::Float(v) => v,
            ParamValue::Int(v) => v as f32,
            ParamValue::Bool(b) => f32::from(u8::from(b)),
            ParamValue::Choice(i) => i as f32,
        }
    }

    fn int(self) -> i32 {
        match self {
            ParamValue::Float(v) => v as i32,
            ParamValue::Int(v) => v,
            ParamValue::Bool(b) => i32::from(b),
            ParamValue::Choice(i) => i as i32,
        }
    }

    fn flag(self) -> bool {
        matches!(self, ParamValue::Bool(true))
    }

    fn choice(self) -> usize {
        match self {
            ParamValue::Choice(i) => i,
            other => other.int().max(0) as usize,
        }
    }
}

/// Every tunable value read by the evaluator and the rebuild path.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiberParams {
    pub fiber_count: u32,
    /// Full revolutions of a ply around the base curve over `t` in `[0, 1]`.
    pub twist_rate: f32,
    pub radius_min: f32,
    pub radius_max: f32,
    pub migration_frequency: f32,
    /// Cross-section scale along the frame normal.
    pub ellipse_cos: f32,
    /// Cross-section scale along the frame binormal.
    pub ellipse_sin: f32,
    /// When false every ply sits at `radius_max`.
    pub enable_migration: bool,
    /// Loop plies use `loop_radius_max` instead of `radius_max`.
    pub separate_loop_radius: bool,
    pub loop_radius_max: f32,
    /// Width of the detached hair ends, in tenths of the curve.
    pub hair_acceptance_threshold: f32,
    pub hair_wiggle_frequency: f32,
    pub hair_wiggle_strength: f32,
    pub hair_sharpness_in: f32,
    pub hair_sharpness_out: f32,
    /// Extra tube thickness along the radial direction.
    pub core_radius: f32,
    pub resolution: u32,
    pub radial_segments: u32,
    pub render_mode: RenderMode,
    pub random_fiber_type: bool,
    pub color_mode: ColorMode,
    /// Only this ply is handed to the host; `-1` shows all of them.
    pub visible_ply: i32,
    pub animation_period: f32,
}

impl Default for FiberParams {
    fn default() -> Self {
        Self {
            fiber_count: 6,
            twist_rate: 1.0,
            radius_min: 0.01,
            radius_max: 0.03,
            migration_frequency: 4.0,
            ellipse_cos: 1.0,
            ellipse_sin: 1.0,
            enable_migration: true,
            separate_loop_radius: false,
            loop_radius_max: 0.05,
            hair_acceptance_threshold: 0.5,
            hair_wiggle_frequency: 5.0,
            hair_wiggle_strength: 0.7,
            hair_sharpness_in: 0.7,
            hair_sharpness_out: 0.7,
            core_radius: 0.005,
            resolution: 64,
            radial_segments: 16,
            render_mode: RenderMode::Tube,
            random_fiber_type: true,
            color_mode: ColorMode::ByPly,
            visible_ply: -1,
            animation_period: 10.0,
        }
    }
}

/// The parameters whose change invalidates the built topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StructuralKey {
    pub fiber_count: u32,
    pub resolution: u32,
    pub radial_segments: u32,
    pub render_mode: RenderMode,
    pub random_fiber_type: bool,
}

impl FiberParams {
    /// Control-panel declarations for every parameter, in display order.
    pub fn declarations() -> Vec<ParamSpec> {
        ParamId::ALL.iter().map(|id| id.spec()).collect()
    }

    pub fn get(&self, id: ParamId) -> ParamValue {
        use ParamValue::{Bool, Choice, Float, Int};

        match id {
            ParamId::FiberCount => Int(self.fiber_count as i32),
            ParamId::TwistRate => Float(self.twist_rate),
            ParamId::RadiusMin => Float(self.radius_min),
            ParamId::RadiusMax => Float(self.radius_max),
            ParamId::MigrationFrequency => Float(self.migration_frequency),
            ParamId::EllipseCos => Float(self.ellipse_cos),
            ParamId::EllipseSin => Float(self.ellipse_sin),
            ParamId::EnableMigration => Bool(self.enable_migration),
            ParamId::SeparateLoopRadius => Bool(self.separate_loop_radius),
            ParamId::LoopRadiusMax => Float(self.loop_radius_max),
            ParamId::HairAcceptanceThreshold => Float(self.hair_acceptance_threshold),
            ParamId::HairWiggleFrequency => Float(self.hair_wiggle_frequency),
            ParamId::HairWiggleStrength => Float(self.hair_wiggle_strength),
            ParamId::HairSharpnessIn => Float(self.hair_sharpness_in),
            ParamId::HairSharpnessOut => Float(self.hair_sharpness_out),
            ParamId::CoreRadius => Float(self.core_radius),
            ParamId::Resolution => Int(self.resolution as i32),
            ParamId::RadialSegments => Int(self.radial_segments as i32),
            ParamId::RenderMode => Choice(self.render_mode.index()),
            ParamId::RandomFiberType => Bool(self.random_fiber_type),
            ParamId::ColorMode => Choice(self.color_mode.index()),
            ParamId::VisiblePly => Int(self.visible_ply),
            ParamId::AnimationPeriod => Float(self.animation_period),
        }
    }

    /// Writes one parameter, clamping it to its declared bounds.
    pub fn set(&mut self, id: ParamId, value: ParamValue) -> SetOutcome {
        let spec = id.spec();
        let Some((applied, clamped)) = spec.kind.admit(value) else {
            warn!(param = spec.name, ?value, "rejected parameter value of the wrong kind");
            return SetOutcome::Rejected;
        };
        self.write(id, applied);

        if clamped {
            warn!(param = spec.name, ?value, ?applied, "clamped parameter to its bounds");
            SetOutcome::Clamped {
                requested: value,
                applied,
            }
        } else {
            SetOutcome::Applied
        }
    }

    fn write(&mut self, id: ParamId, value: ParamValue) {
        match id {
            ParamId::FiberCount => self.fiber_count = value.int().max(1) as u32,
            ParamId::TwistRate => self.twist_rate = value.float(),
            ParamId::RadiusMin => self.radius_min = value.float(),
            ParamId::RadiusMax => self.radius_max = value.float(),
            ParamId::MigrationFrequency => self.migration_frequency = value.float(),
            ParamId::EllipseCos => self.ellipse_cos = value.float(),
            ParamId::EllipseSin => self.ellipse_sin = value.float(),
            ParamId::EnableMigration => self.enable_migration = value.flag(),
            ParamId::SeparateLoopRadius => self.separate_loop_radius = value.flag(),
            ParamId::LoopRadiusMax => self.loop_radius_max = value.float(),
            ParamId::HairAcceptanceThreshold => self.hair_acceptance_threshold = value.float(),
            ParamId::HairWiggleFrequency => self.hair_wiggle_frequency = value.float(),
            ParamId::HairWiggleStrength => self.hair_wiggle_strength = value.float(),
            ParamId::HairSharpnessIn => self.hair_sharpness_in = value.float(),
            ParamId::HairSharpnessOut => self.hair_sharpness_out = value.float(),
            ParamId::CoreRadius => self.core_radius = value.float(),
            ParamId::Resolution => self.resolution = value.int().max(1) as u32,
            ParamId::RadialSegments => self.radial_segments = value.int().max(1) as u32,
            ParamId::RenderMode => self.render_mode = RenderMode::from_index(value.choice()),
            ParamId::RandomFiberType => self.random_fiber_type = value.flag(),
            ParamId::ColorMode => self.color_mode = ColorMode::from_index(value.choice()),
            ParamId::VisiblePly => self.visible_ply = value.int(),
            ParamId::AnimationPeriod => self.animation_period = value.float(),
        }
    }

    /// Clamps every field to its bounds, returning how many were changed.
    pub fn sanitize(&mut self) -> usize {
        ParamId::ALL
            .into_iter()
            .filter(|&id| {
                let current = self.get(id);
                matches!(self.set(id, current), SetOutcome::Clamped { .. })
            })
            .count()
    }

    pub fn structural_key(&self) -> StructuralKey {
        StructuralKey {
            fiber_count: self.fiber_count,
            resolution: self.resolution,
            radial_segments: self.radial_segments,
            render_mode: self.render_mode,
            random_fiber_type: self.random_fiber_type,
        }
    }

    pub fn topology_request(&self) -> TopologyRequest {
        TopologyRequest {
            mode: self.render_mode,
            fiber_count: self.fiber_count,
            resolution: self.resolution,
            radial_segments: self.radial_segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn defaults_match_declarations() {
        let params = FiberParams::default();
        for spec in FiberParams::declarations() {
            assert_eq!(params.get(spec.id), spec.default, "{}", spec.name);
        }
    }

    #[test]
    fn names_are_unique_and_resolvable() {
        let names: HashSet<_> = ParamId::ALL.iter().map(|id| id.name()).collect();
        assert_eq!(names.len(), ParamId::ALL.len());
        for id in ParamId::ALL {
            assert_eq!(ParamId::from_name(id.name()), Some(id));
        }
        assert_eq!(ParamId::from_name("nope"), None);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut params = FiberParams::default();

        let outcome = params.set(ParamId::RadiusMin, ParamValue::Float(-1.0));
        assert_eq!(
            outcome,
            SetOutcome::Clamped {
                requested: ParamValue::Float(-1.0),
                applied: ParamValue::Float(0.001),
            }
        );
        assert_eq!(params.radius_min, 0.001);

        params.set(ParamId::FiberCount, ParamValue::Int(500));
        assert_eq!(params.fiber_count, 64);

        params.set(ParamId::CoreRadius, ParamValue::Float(f32::NAN));
        assert_eq!(params.core_radius, 0.0);

        params.set(ParamId::ColorMode, ParamValue::Choice(99));
        assert_eq!(params.color_mode, ColorMode::Uniform);
    }

    #[test]
    fn in_range_values_apply_and_coerce() {
        let mut params = FiberParams::default();
        assert_eq!(params.set(ParamId::TwistRate, ParamValue::Int(3)), SetOutcome::Applied);
        assert_eq!(params.twist_rate, 3.0);
        assert_eq!(params.set(ParamId::Resolution, ParamValue::Float(12.0)), SetOutcome::Applied);
        assert_eq!(params.resolution, 12);
        assert_eq!(
            params.set(ParamId::RenderMode, ParamValue::Choice(0)),
            SetOutcome::Applied
        );
        assert_eq!(params.render_mode, RenderMode::Line);
    }

    #[test]
    fn wrong_kind_is_rejected_without_writing() {
        let mut params = FiberParams::default();
        assert_eq!(
            params.set(ParamId::TwistRate, ParamValue::Bool(true)),
            SetOutcome::Rejected
        );
        assert_eq!(params.twist_rate, 1.0);
        assert_eq!(
            params.set(ParamId::EnableMigration, ParamValue::Float(1.0)),
            SetOutcome::Rejected
        );
        assert!(params.enable_migration);
    }

    #[test]
    fn sanitize_clamps_deserialized_values() {
        let mut params: FiberParams =
            serde_json::from_str(r#"{ "fiber_count": 0, "radius_max": 4.0, "render_mode": "line" }"#)
                .unwrap();
        assert_eq!(params.render_mode, RenderMode::Line);
        assert_eq!(params.twist_rate, 1.0);

        assert_eq!(params.sanitize(), 2);
        assert_eq!(params.fiber_count, 1);
        assert_eq!(params.radius_max, 0.1);
        assert_eq!(params.sanitize(), 0);
    }

    #[test]
    fn only_structural_params_change_the_key() {
        let base = FiberParams::default();
        for id in ParamId::ALL {
            let mut changed = base;
            let value = match id.spec().kind {
                ParamKind::Float { max, .. } => ParamValue::Float(max),
                ParamKind::Int { min, .. } => ParamValue::Int(min),
                ParamKind::Bool => ParamValue::Bool(!base.get(id).flag()),
                ParamKind::Choice(_) => ParamValue::Choice(0),
            };
            changed.set(id, value);
            let key_changed = changed.structural_key() != base.structural_key();
            if key_changed {
                assert!(id.is_structural(), "{id:?} changed the key");
            }
        }
        let mut changed = base;
        changed.set(ParamId::Resolution, ParamValue::Int(8));
        assert_ne!(changed.structural_key(), base.structural_key());
    }
}
