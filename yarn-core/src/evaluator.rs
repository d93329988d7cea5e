//! Per-vertex fiber position evaluation.
//!
//! [`EvalContext::evaluate`] is a pure function of one [`VertexRecord`], the
//! lookup buffer and a parameter snapshot. It never reads another vertex,
//! so [`evaluate_into`] can hand vertices to `rayon` in any order.
//!
//! For a vertex at curve parameter `t` of ply `p`:
//! 1. The base point is a Catmull-Rom blend of the four nearest curve
//!    points; the frame is the blend of the two nearest transported frames.
//! 2. `angle = 2π p / fiber_count + twist_rate 2π t`, plus the ring angle in
//!    tube mode and the wiggle for hair plies.
//! 3. The radius follows the migration law of the ply's [`FiberType`].
//! 4. `offset = radius (cos(angle) ellipse_cos N + sin(angle) ellipse_sin B)`.

use std::f32::consts::TAU;

use glam::Vec3;
use rayon::prelude::*;

use crate::curve_store::{CurveLookupBuffer, CurveSpan};
use crate::frame::Frame;
use crate::params::FiberParams;
use crate::shading::shade;
use crate::topology::VertexRecord;
use crate::types::{FiberType, RenderMode};

/// Opacity of a fully detached hair end.
pub const HAIR_MIN_OPACITY: f32 = 0.35;

/// Evaluator output for one vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FiberSample {
    pub position: Vec3,
    /// Distance of the fiber from the base curve before ellipse scaling.
    pub radius: f32,
    /// `1` for attached fibers, down to [`HAIR_MIN_OPACITY`] at hair ends.
    pub opacity: f32,
    pub fiber_type: FiberType,
}

/// Everything one evaluation pass reads besides the vertex itself.
#[derive(Clone, Copy, Debug)]
pub struct EvalContext<'a> {
    pub lookup: &'a CurveLookupBuffer,
    pub params: &'a FiberParams,
    /// Mode the vertices were built for.
    pub mode: RenderMode,
    /// Seconds since start; drives the hair wiggle.
    pub time: f32,
}

/// Base point and frame of `span` at parametric position `t`.
///
/// `t` is clamped to `[0, 1]`. Open curves map `t = 1` to the last point;
/// closed curves map it back onto the first one.
pub fn sample_curve(lookup: &CurveLookupBuffer, span: &CurveSpan, t: f32) -> (Vec3, Frame) {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let n = span.len.max(1);

    if n == 1 {
        let frame = Frame::from_tangent(lookup.tangent(span.start));
        return (lookup.position(span.start), frame);
    }

    let (segments, last_segment) = if span.closed { (n, n - 1) } else { (n - 1, n - 2) };
    let s = t * segments as f32;
    let i = (s.floor() as u32).min(last_segment);
    let f = s - i as f32;
    let i = i64::from(i);

    let point = |k: i64| lookup.position(span.texel_index(k));
    let position = catmull_rom(point(i - 1), point(i), point(i + 1), point(i + 2), f);

    let a = span.texel_index(i);
    let b = span.texel_index(i + 1);
    let tangent = lookup.tangent(a).lerp(lookup.tangent(b), f);
    let normal = lookup.normal(a).lerp(lookup.normal(b), f);
    let frame = Frame::orthonormalize(tangent, normal, lookup.tangent(a));

    (position, frame)
}

/// Uniform Catmull-Rom segment between `p1` (`f = 0`) and `p2` (`f = 1`).
#[inline]
pub fn catmull_rom(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, f: f32) -> Vec3 {
    let c1 = p2 - p0;
    let c2 = 2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3;
    let c3 = -p0 + 3.0 * p1 - 3.0 * p2 + p3;
    0.5 * (2.0 * p1 + f * (c1 + f * (c2 + f * c3)))
}

/// Angular offset of `ply` so plies are spread evenly around the curve.
#[inline]
pub fn initial_angle(ply: u32, fiber_count: u32) -> f32 {
    TAU * ply as f32 / fiber_count.max(1) as f32
}

#[inline]
pub fn twist_angle(twist_rate: f32, t: f32) -> f32 {
    twist_rate * TAU * t
}

/// Distance from the base curve, oscillating between `r_min` and `r_max`.
#[inline]
pub fn migration_radius(r_min: f32, r_max: f32, phase: f32) -> f32 {
    0.5 * (r_max + r_min + (r_max - r_min) * phase.cos())
}

/// How firmly a hair fiber is attached at `t`: `0` at the free ends, `1` in
/// the interior.
///
/// ### Parameters
/// - `t` - Parametric position, in `[0, 1]`.
/// - `threshold` - Hair acceptance threshold; the free ends span
///   `0.1 * threshold` of the curve on each side (at most half).
/// - `sharpness_in` - Exponent of the ramp at `t = 0`.
/// - `sharpness_out` - Exponent of the ramp at `t = 1`.
pub fn hair_attachment(t: f32, threshold: f32, sharpness_in: f32, sharpness_out: f32) -> f32 {
    let edge = (0.1 * threshold).clamp(0.0, 0.5);
    if edge <= 0.0 {
        return 1.0;
    }
    let head = (t / edge).clamp(0.0, 1.0).powf(sharpness_in.max(0.0));
    let tail = ((1.0 - t) / edge).clamp(0.0, 1.0).powf(sharpness_out.max(0.0));
    head * tail
}

impl EvalContext<'_> {
    /// Position and classification of one vertex.
    pub fn evaluate(&self, vertex: &VertexRecord) -> FiberSample {
        let p = self.params;
        let fiber_type = vertex.fiber_type();
        let t = vertex.eval_t();

        let (base, frame) = match self.lookup.span(vertex.curve) {
            Some(span) => sample_curve(self.lookup, span, t),
            None => {
                let index = vertex.curve_sample_index;
                (self.lookup.position(index), Frame::from_tangent(self.lookup.tangent(index)))
            }
        };

        let initial = initial_angle(vertex.ply_index, p.fiber_count);
        let twist = twist_angle(p.twist_rate, t);

        let r_max = match fiber_type {
            FiberType::Loop if p.separate_loop_radius => p.loop_radius_max,
            _ => p.radius_max,
        };
        let attached = if p.enable_migration {
            migration_radius(p.radius_min, r_max, initial + p.migration_frequency * twist)
        } else {
            r_max
        };

        let mut angle = initial + twist;
        let (radius, opacity) = match fiber_type {
            FiberType::Migration | FiberType::Loop => (attached, 1.0),
            FiberType::Hair => {
                let a = hair_attachment(
                    t,
                    p.hair_acceptance_threshold,
                    p.hair_sharpness_in,
                    p.hair_sharpness_out,
                );
                let detached = p.radius_max * (1.0 + p.hair_acceptance_threshold);
                let wiggle = p.hair_wiggle_frequency * (TAU * t + self.time);
                angle += (1.0 - a) * p.hair_wiggle_strength * wiggle.sin();
                (
                    detached + (attached - detached) * a,
                    HAIR_MIN_OPACITY + (1.0 - HAIR_MIN_OPACITY) * a,
                )
            }
        };

        if self.mode == RenderMode::Tube {
            angle += TAU * vertex.radial_t;
        }

        let (sin, cos) = angle.sin_cos();
        let mut offset =
            radius * (cos * p.ellipse_cos * frame.normal + sin * p.ellipse_sin * frame.binormal);
        if self.mode == RenderMode::Tube {
            offset += p.core_radius * frame.radial(angle);
        }

        FiberSample {
            position: base + offset,
            radius,
            opacity,
            fiber_type,
        }
    }
}

/// Evaluates every vertex of a ply into reusable output buffers.
///
/// `positions` and `colors` are resized to `vertices.len()`; their
/// allocations are kept across calls.
pub fn evaluate_into(
    ctx: &EvalContext<'_>,
    vertices: &[VertexRecord],
    positions: &mut Vec<[f32; 3]>,
    colors: &mut Vec<[f32; 4]>,
) {
    positions.resize(vertices.len(), [0.0; 3]);
    colors.resize(vertices.len(), [0.0; 4]);

    vertices
        .par_iter()
        .zip(positions.par_iter_mut())
        .zip(colors.par_iter_mut())
        .for_each(|((vertex, position), color)| {
            let sample = ctx.evaluate(vertex);
            *position = sample.position.to_array();
            *color = shade(vertex, &sample, ctx.params);
        });
}
