//! Rotation-minimizing frames along sampled curves.
//!
//! Frames are transported from point to point instead of being rebuilt
//! independently, so the normal never flips at high curvature. They are
//! computed once per curve load and packed next to the positions in the
//! lookup buffer; the evaluator only interpolates between neighbours.

use glam::{Quat, Vec3};

/// Orthonormal basis at a point on a curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub tangent: Vec3,
    pub normal: Vec3,
    pub binormal: Vec3,
}

impl Frame {
    /// Builds a frame around `tangent` with an arbitrary perpendicular normal.
    ///
    /// A zero tangent falls back to `+Z`.
    pub fn from_tangent(tangent: Vec3) -> Self {
        let tangent = tangent.try_normalize().unwrap_or(Vec3::Z);
        let normal = find_perpendicular(tangent);
        Self {
            tangent,
            normal,
            binormal: tangent.cross(normal),
        }
    }

    /// Re-orthonormalizes an interpolated frame.
    ///
    /// `tangent` wins; `normal_hint` is projected onto the plane orthogonal
    /// to it. Degenerate inputs fall back to `fallback_tangent`, then `+Z`,
    /// and to an arbitrary perpendicular normal, so the result is never NaN.
    pub fn orthonormalize(tangent: Vec3, normal_hint: Vec3, fallback_tangent: Vec3) -> Self {
        let tangent = tangent
            .try_normalize()
            .or_else(|| fallback_tangent.try_normalize())
            .unwrap_or(Vec3::Z);
        let normal = (normal_hint - tangent * normal_hint.dot(tangent))
            .try_normalize()
            .unwrap_or_else(|| find_perpendicular(tangent));
        Self {
            tangent,
            normal,
            binormal: tangent.cross(normal),
        }
    }

    /// Unit direction in the normal plane at `angle` radians from the normal.
    #[inline]
    pub fn radial(&self, angle: f32) -> Vec3 {
        let (sin, cos) = angle.sin_cos();
        self.normal * cos + self.binormal * sin
    }
}

/// Finds a unit vector perpendicular to the unit vector `v`.
fn find_perpendicular(v: Vec3) -> Vec3 {
    // Cross with the axis least aligned with v.
    let (ax, ay, az) = (v.x.abs(), v.y.abs(), v.z.abs());
    let axis = if ax <= ay && ax <= az {
        Vec3::X
    } else if ay <= az {
        Vec3::Y
    } else {
        Vec3::Z
    };
    v.cross(axis).try_normalize().unwrap_or(Vec3::Y)
}

/// Per-point tangents from the neighbouring points.
///
/// Open curves reuse the endpoint itself as its missing neighbour; closed
/// curves wrap. Coincident neighbours inherit the previous tangent.
pub fn curve_tangents(points: &[Vec3], closed: bool) -> Vec<Vec3> {
    let n = points.len();
    let mut tangents = Vec::with_capacity(n);
    let mut last = Vec3::Z;

    for i in 0..n {
        let prev = if i > 0 {
            points[i - 1]
        } else if closed {
            points[n - 1]
        } else {
            points[i]
        };
        let next = if i + 1 < n {
            points[i + 1]
        } else if closed {
            points[0]
        } else {
            points[i]
        };

        let tangent = (next - prev).try_normalize().unwrap_or(last);
        tangents.push(tangent);
        last = tangent;
    }

    // A curve that starts with coincident points got +Z up front; give those
    // points the first real tangent instead.
    if let Some(first_real) = (0..n).find(|&i| (points[i] - points[0]).length_squared() > 0.0) {
        let real = tangents[first_real];
        for t in tangents.iter_mut().take(first_real) {
            *t = real;
        }
    }

    tangents
}

/// Parallel-transport frames for every point of a curve.
///
/// The first frame is built from the first tangent; each following frame
/// rotates its predecessor by the shortest arc between consecutive tangents.
///
/// On closed curves the frame transported once around the loop generally
/// comes back twisted against the first one. That twist is spread evenly
/// over all points, so the closing segment turns no faster than the rest.
pub fn parallel_transport_frames(points: &[Vec3], closed: bool) -> Vec<Frame> {
    let tangents = curve_tangents(points, closed);
    let mut frames: Vec<Frame> = Vec::with_capacity(tangents.len());

    for &tangent in &tangents {
        let frame = match frames.last() {
            None => Frame::from_tangent(tangent),
            Some(prev) => transport(prev, tangent),
        };
        frames.push(frame);
    }

    if closed {
        distribute_closure_twist(&mut frames);
    }
    frames
}

/// Signed angle about `axis` that rotates `from` onto `to`.
fn signed_angle(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    from.cross(to).dot(axis).atan2(from.dot(to))
}

fn distribute_closure_twist(frames: &mut [Frame]) {
    let n = frames.len();
    if n < 2 {
        return;
    }
    let first = frames[0];
    let wrapped = transport(&frames[n - 1], first.tangent);
    let twist = signed_angle(wrapped.normal, first.normal, first.tangent);
    if twist == 0.0 || !twist.is_finite() {
        return;
    }

    for (i, frame) in frames.iter_mut().enumerate().skip(1) {
        let normal = frame.radial(twist * i as f32 / n as f32);
        *frame = Frame::orthonormalize(frame.tangent, normal, frame.tangent);
    }
}

fn transport(prev: &Frame, tangent: Vec3) -> Frame {
    let rotation = Quat::from_rotation_arc(prev.tangent, tangent);
    Frame::orthonormalize(tangent, rotation * prev.normal, prev.tangent)
}
