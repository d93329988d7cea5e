//! Mesh connectivity and per-vertex metadata.
//!
//! Positions are never stored here: every vertex carries a
//! [`VertexRecord`] that the evaluator turns into a position each frame.
//! One [`PlyMesh`] is built per ply so hosts can show or hide plies
//! individually.
//!
//! - **Line mode**: every curve point is replicated `resolution` times and
//!   consecutive vertices are joined by `(i, i + 1)` pairs.
//! - **Tube mode**: `resolution` rings of `radial_segments` vertices per
//!   curve, each quad split into two triangles.

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::curve_store::{CurveLookupBuffer, CurveSpan};
use crate::error::{FiberError, FiberResult};
use crate::types::{FiberType, PlyIndex, RenderMode, SampleIndex};

/// Smallest ring resolution accepted in tube mode.
pub const MIN_RADIAL_SEGMENTS: u32 = 3;

/// Metadata of one output vertex, laid out for direct upload as vertex
/// attributes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VertexRecord {
    pub ply_index: PlyIndex,
    /// Parametric position along the base curve, in `[0, 1]`.
    pub curve_t: f32,
    /// `curve_t` of the next sample; equals `curve_t` at the last one.
    pub next_curve_t: f32,
    /// Line mode: `replica / resolution`, moving the sample towards
    /// `next_curve_t`. Always `0` in tube mode.
    pub segment_fraction: f32,
    /// Ring angle fraction in `[0, 1)`; `0` in line mode.
    pub radial_t: f32,
    /// Lookup texel of the curve point at or before this sample.
    pub curve_sample_index: SampleIndex,
    /// Curve this vertex follows, as an index into the lookup spans.
    pub curve: u32,
    /// [`FiberType::as_raw`] of the owning ply.
    pub fiber_type: u32,
}

impl VertexRecord {
    #[inline]
    pub fn fiber_type(&self) -> FiberType {
        FiberType::from_raw(self.fiber_type)
    }

    /// Parametric position the evaluator samples.
    #[inline]
    pub fn eval_t(&self) -> f32 {
        self.curve_t + (self.next_curve_t - self.curve_t) * self.segment_fraction
    }
}

/// Vertices and indices of one ply.
#[derive(Clone, Debug, PartialEq)]
pub struct PlyMesh {
    pub ply: PlyIndex,
    pub fiber_type: FiberType,
    pub vertices: Vec<VertexRecord>,
    pub indices: Vec<u32>,
}

impl PlyMesh {
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Structural inputs of a rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TopologyRequest {
    pub mode: RenderMode,
    pub fiber_count: u32,
    /// Line mode: supersampling factor per curve point.
    /// Tube mode: rings per curve.
    pub resolution: u32,
    /// Vertices per ring; ignored in line mode.
    pub radial_segments: u32,
}

impl TopologyRequest {
    /// Rejects counts that cannot produce geometry.
    pub fn validate(&self) -> FiberResult<()> {
        check("fiber count", self.fiber_count, 1)?;
        check("resolution", self.resolution, 1)?;
        if self.mode == RenderMode::Tube {
            check("radial segments", self.radial_segments, MIN_RADIAL_SEGMENTS)?;
        }
        Ok(())
    }
}

fn check(what: &'static str, actual: u32, min: u32) -> FiberResult<()> {
    if actual < min {
        Err(FiberError::Topology { what, min, actual })
    } else {
        Ok(())
    }
}

/// All ply meshes of one rebuild.
#[derive(Clone, Debug, PartialEq)]
pub struct FiberGeometry {
    pub request: TopologyRequest,
    pub plies: Vec<PlyMesh>,
}

impl FiberGeometry {
    pub fn mode(&self) -> RenderMode {
        self.request.mode
    }

    pub fn vertex_count(&self) -> usize {
        self.plies.iter().map(|p| p.vertices.len()).sum()
    }

    pub fn index_count(&self) -> usize {
        self.plies.iter().map(|p| p.indices.len()).sum()
    }
}

/// Builds metadata and connectivity for every ply.
///
/// ### Parameters
/// - `lookup` - Packed curves; only the spans are read.
/// - `request` - Mode and counts.
/// - `fiber_types` - One type per ply, from [`crate::classifier`]. Plies
///   past the end of the slice fall back to [`FiberType::Migration`].
///
/// ### Returns
/// The geometry, or [`FiberError::Topology`] if a count is too small.
pub fn build_geometry(
    lookup: &CurveLookupBuffer,
    request: TopologyRequest,
    fiber_types: &[FiberType],
) -> FiberResult<FiberGeometry> {
    request.validate()?;

    let spans = lookup.spans();
    let plies: Vec<PlyMesh> = (0..request.fiber_count)
        .map(|ply| {
            let fiber_type = fiber_types
                .get(ply as usize)
                .copied()
                .unwrap_or(FiberType::Migration);
            match request.mode {
                RenderMode::Line => line_ply(spans, ply, fiber_type, request.resolution),
                RenderMode::Tube => tube_ply(
                    spans,
                    ply,
                    fiber_type,
                    request.resolution,
                    request.radial_segments,
                ),
            }
        })
        .collect();

    let geometry = FiberGeometry { request, plies };
    debug!(
        mode = ?request.mode,
        plies = request.fiber_count,
        vertices = geometry.vertex_count(),
        indices = geometry.index_count(),
        "built fiber topology"
    );
    Ok(geometry)
}

/// Parametric position of point `i` among `n`.
#[inline]
fn point_t(i: u32, n: u32) -> f32 {
    if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 }
}

fn line_ply(spans: &[CurveSpan], ply: PlyIndex, fiber_type: FiberType, resolution: u32) -> PlyMesh {
    let total: usize = spans.iter().map(|s| s.len as usize).sum();
    let mut vertices = Vec::with_capacity(total * resolution as usize);
    // Vertex indices that end a curve and must not bridge to the next one.
    let mut curve_ends = Vec::with_capacity(spans.len());

    for (curve, span) in spans.iter().enumerate() {
        let n = span.len;
        for i in 0..n {
            let curve_t = point_t(i, n);
            let next_curve_t = if i + 1 < n { point_t(i + 1, n) } else { curve_t };
            for r in 0..resolution {
                vertices.push(VertexRecord {
                    ply_index: ply,
                    curve_t,
                    next_curve_t,
                    segment_fraction: r as f32 / resolution as f32,
                    radial_t: 0.0,
                    curve_sample_index: span.start + i,
                    curve: curve as u32,
                    fiber_type: fiber_type.as_raw(),
                });
            }
        }
        curve_ends.push(vertices.len() as u32 - 1);
    }

    let indices = line_indices(vertices.len() as u32, &curve_ends);
    PlyMesh {
        ply,
        fiber_type,
        vertices,
        indices,
    }
}

/// `(i, i + 1)` pairs for `i` in `[0, vertex_count - 2]`.
///
/// A vertex listed in `curve_ends` pairs with itself instead of bridging to
/// the first vertex of the next curve, which keeps the index count at
/// `2 * (vertex_count - 1)`.
pub fn line_indices(vertex_count: u32, curve_ends: &[u32]) -> Vec<u32> {
    let mut indices = Vec::with_capacity(2 * vertex_count.saturating_sub(1) as usize);
    let mut ends = curve_ends.iter().copied().peekable();
    for i in 0..vertex_count.saturating_sub(1) {
        while ends.next_if(|&end| end < i).is_some() {}
        let next = if ends.peek() == Some(&i) { i } else { i + 1 };
        indices.push(i);
        indices.push(next);
    }
    indices
}

fn tube_ply(
    spans: &[CurveSpan],
    ply: PlyIndex,
    fiber_type: FiberType,
    rings: u32,
    radial: u32,
) -> PlyMesh {
    let per_curve = (rings * radial) as usize;
    let mut vertices = Vec::with_capacity(spans.len() * per_curve);
    let mut indices = Vec::with_capacity(spans.len() * tube_index_count(rings, radial));

    for (curve, span) in spans.iter().enumerate() {
        let base = vertices.len() as u32;
        for i in 0..rings {
            let curve_t = point_t(i, rings);
            let next_curve_t = if i + 1 < rings { point_t(i + 1, rings) } else { curve_t };
            let local = (curve_t * (span.len - 1) as f32).floor() as u32;
            let curve_sample_index = span.start + local.min(span.len - 1);
            for j in 0..radial {
                vertices.push(VertexRecord {
                    ply_index: ply,
                    curve_t,
                    next_curve_t,
                    segment_fraction: 0.0,
                    radial_t: j as f32 / radial as f32,
                    curve_sample_index,
                    curve: curve as u32,
                    fiber_type: fiber_type.as_raw(),
                });
            }
        }
        indices.extend(tube_ring_indices(rings, radial).into_iter().map(|i| i + base));
    }

    PlyMesh {
        ply,
        fiber_type,
        vertices,
        indices,
    }
}

/// Index count of one tube: `(rings - 1) * radial * 6`.
#[inline]
pub fn tube_index_count(rings: u32, radial: u32) -> usize {
    rings.saturating_sub(1) as usize * radial as usize * 6
}

/// Triangulates the quads between consecutive rings.
///
/// With `a = i*R + j`, `b = i*R + (j+1) % R`, `c = (i+1)*R + j` and
/// `d = (i+1)*R + (j+1) % R`, each quad yields `(a, b, d)` and `(a, d, c)`.
/// The angle wraps, the rings do not.
pub fn tube_ring_indices(rings: u32, radial: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity(tube_index_count(rings, radial));
    for i in 0..rings.saturating_sub(1) {
        for j in 0..radial {
            let a = i * radial + j;
            let b = i * radial + (j + 1) % radial;
            let c = (i + 1) * radial + j;
            let d = (i + 1) * radial + (j + 1) % radial;
            indices.extend_from_slice(&[a, b, d, a, d, c]);
        }
    }
    indices
}
