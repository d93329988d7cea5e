//! Fixed-width 2-D lookup buffer packing every curve point.
//!
//! The buffer is the CPU image of the curve texture the vertex evaluator
//! samples: texels are `[x, y, z, 1.0]`, row-major, `width` texels per row.
//! Alongside the positions it carries two planes with the same addressing:
//! transported tangents and normals, so frames can be interpolated per
//! vertex without recomputing them.

use glam::Vec3;
use tracing::debug;

use crate::curve_source::CurveSet;
use crate::error::DataError;
use crate::frame::parallel_transport_frames;
use crate::types::SampleIndex;

/// Default texels per row, matching common float-texture limits.
pub const DEFAULT_LOOKUP_WIDTH: u32 = 512;

/// Widest lookup buffer a texture upload is expected to accept.
pub const MAX_LOOKUP_WIDTH: u32 = 16384;

/// One RGBA32F texel.
pub type Texel = [f32; 4];

/// Value of every texel past `total_points`.
pub const PADDING_TEXEL: Texel = [0.0, 0.0, 0.0, 1.0];

/// Location of one input curve inside the lookup buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CurveSpan {
    /// Texel index of the first point.
    pub start: SampleIndex,
    /// Number of points, at least 1.
    pub len: u32,
    pub closed: bool,
}

impl CurveSpan {
    /// Texel index of local point `local`, clamped to the span (or wrapped
    /// for closed curves).
    #[inline]
    pub fn texel_index(&self, local: i64) -> SampleIndex {
        let len = i64::from(self.len.max(1));
        let local = if self.closed {
            local.rem_euclid(len)
        } else {
            local.clamp(0, len - 1)
        };
        self.start + local as u32
    }
}

/// Read-only, randomly addressable image of all curve points.
#[derive(Clone, Debug, PartialEq)]
pub struct CurveLookupBuffer {
    width: u32,
    height: u32,
    total_points: u32,
    positions: Vec<Texel>,
    tangents: Vec<Texel>,
    normals: Vec<Texel>,
    spans: Vec<CurveSpan>,
}

impl CurveLookupBuffer {
    /// Packs `curves` in file order into a `width`-wide buffer.
    ///
    /// The buffer is assembled completely before it is returned, so callers
    /// swapping it in never expose a partial image.
    ///
    /// ### Parameters
    /// - `curves` - Curves to pack; must be non-empty with no empty curve.
    /// - `width` - Texels per row, clamped to `1..=MAX_LOOKUP_WIDTH`.
    ///
    /// ### Returns
    /// The packed buffer, or a [`DataError`] if the input is empty.
    pub fn build(curves: &CurveSet, width: u32) -> Result<Self, DataError> {
        curves.validate()?;

        let width = width.clamp(1, MAX_LOOKUP_WIDTH);
        let total = curves.total_points();
        let total_points = u32::try_from(total).map_err(|_| DataError::TooManyPoints(total))?;
        let height = total_points.div_ceil(width);
        let capacity = width as usize * height as usize;

        let mut positions = Vec::with_capacity(capacity);
        let mut tangents = Vec::with_capacity(capacity);
        let mut normals = Vec::with_capacity(capacity);
        let mut spans = Vec::with_capacity(curves.curves.len());

        for curve in &curves.curves {
            let points: Vec<Vec3> = curve.points.iter().map(|&p| Vec3::from_array(p)).collect();
            let frames = parallel_transport_frames(&points, curve.closed);

            spans.push(CurveSpan {
                start: positions.len() as u32,
                len: points.len() as u32,
                closed: curve.closed,
            });

            for (p, frame) in points.iter().zip(&frames) {
                positions.push(p.extend(1.0).to_array());
                tangents.push(frame.tangent.extend(0.0).to_array());
                normals.push(frame.normal.extend(0.0).to_array());
            }
        }

        positions.resize(capacity, PADDING_TEXEL);
        tangents.resize(capacity, PADDING_TEXEL);
        normals.resize(capacity, PADDING_TEXEL);

        debug!(
            curves = spans.len(),
            total_points,
            width,
            height,
            "packed curve lookup buffer"
        );

        Ok(Self {
            width,
            height,
            total_points,
            positions,
            tangents,
            normals,
            spans,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of real (non-padding) texels.
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    pub fn spans(&self) -> &[CurveSpan] {
        &self.spans
    }

    pub fn span(&self, curve: u32) -> Option<&CurveSpan> {
        self.spans.get(curve as usize)
    }

    /// `(row, col)` of texel `index`.
    #[inline]
    pub fn texel_coords(&self, index: SampleIndex) -> (u32, u32) {
        (index / self.width, index % self.width)
    }

    /// Position texel at `index`, or [`PADDING_TEXEL`] past the real points.
    #[inline]
    pub fn texel(&self, index: SampleIndex) -> Texel {
        Self::read(&self.positions, self.total_points, index)
    }

    /// Position texel at `(row, col)`, the way a shader would fetch it.
    #[inline]
    pub fn texel_at(&self, row: u32, col: u32) -> Texel {
        if col >= self.width {
            return PADDING_TEXEL;
        }
        match row.checked_mul(self.width).and_then(|r| r.checked_add(col)) {
            Some(index) => self.texel(index),
            None => PADDING_TEXEL,
        }
    }

    #[inline]
    pub fn position(&self, index: SampleIndex) -> Vec3 {
        Vec3::from_slice(&self.texel(index)[..3])
    }

    #[inline]
    pub fn tangent(&self, index: SampleIndex) -> Vec3 {
        Vec3::from_slice(&Self::read(&self.tangents, self.total_points, index)[..3])
    }

    #[inline]
    pub fn normal(&self, index: SampleIndex) -> Vec3 {
        Vec3::from_slice(&Self::read(&self.normals, self.total_points, index)[..3])
    }

    /// Position plane as raw bytes for texture upload.
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn tangent_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.tangents)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    #[inline]
    fn read(plane: &[Texel], total_points: u32, index: SampleIndex) -> Texel {
        if index < total_points {
            plane[index as usize]
        } else {
            PADDING_TEXEL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve_source::Curve;

    fn curve(points: &[[f32; 3]]) -> Curve {
        Curve {
            points: points.to_vec(),
            closed: false,
        }
    }

    #[test]
    fn texels_roundtrip_and_pad() {
        let set = CurveSet::new(vec![
            curve(&[[0.0, 0.0, 0.0], [1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]),
            curve(&[[7.0, 8.0, 9.0], [10.0, 11.0, 12.0]]),
        ]);
        let buf = CurveLookupBuffer::build(&set, 4).unwrap();

        assert_eq!(buf.total_points(), 5);
        assert_eq!(buf.width(), 4);
        assert_eq!(buf.height(), 2);

        let flat: Vec<[f32; 3]> = set.curves.iter().flat_map(|c| c.points.clone()).collect();
        for (i, p) in flat.iter().enumerate() {
            assert_eq!(buf.texel(i as u32), [p[0], p[1], p[2], 1.0]);
            let (row, col) = buf.texel_coords(i as u32);
            assert_eq!(buf.texel_at(row, col), buf.texel(i as u32));
        }
        for i in 5..8 {
            assert_eq!(buf.texel(i), PADDING_TEXEL);
        }
        assert_eq!(buf.texel(10_000), PADDING_TEXEL);
        assert_eq!(buf.texel_at(0, 4), PADDING_TEXEL);
    }

    #[test]
    fn oversized_width_is_capped() {
        let set = CurveSet::new(vec![curve(&[[0.0; 3], [1.0, 0.0, 0.0]])]);
        let buf = CurveLookupBuffer::build(&set, u32::MAX).unwrap();
        assert_eq!(buf.width(), MAX_LOOKUP_WIDTH);
        assert_eq!(buf.height(), 1);
        assert_eq!(buf.texel(1), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn index_maps_to_row_and_column() {
        let set = CurveSet::new(vec![curve(&[[0.0; 3]; 1030])]);
        let buf = CurveLookupBuffer::build(&set, DEFAULT_LOOKUP_WIDTH).unwrap();

        assert_eq!(buf.height(), 3);
        assert_eq!(buf.texel_coords(0), (0, 0));
        assert_eq!(buf.texel_coords(511), (0, 511));
        assert_eq!(buf.texel_coords(512), (1, 0));
        assert_eq!(buf.texel_coords(1029), (2, 5));
        assert_eq!(buf.position_bytes().len(), 3 * 512 * 16);
    }

    #[test]
    fn spans_follow_file_order() {
        let set = CurveSet::new(vec![
            curve(&[[0.0; 3], [1.0, 0.0, 0.0]]),
            Curve {
                points: vec![[0.0; 3], [0.0, 1.0, 0.0], [0.0, 2.0, 0.0]],
                closed: true,
            },
        ]);
        let buf = CurveLookupBuffer::build(&set, 8).unwrap();
        let spans = buf.spans();

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], CurveSpan { start: 0, len: 2, closed: false });
        assert_eq!(spans[1], CurveSpan { start: 2, len: 3, closed: true });

        assert_eq!(spans[0].texel_index(-1), 0);
        assert_eq!(spans[0].texel_index(5), 1);
        assert_eq!(spans[1].texel_index(-1), 4);
        assert_eq!(spans[1].texel_index(3), 2);
    }

    #[test]
    fn frame_planes_are_unit_length() {
        let set = CurveSet::new(vec![curve(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 1.0, 1.0],
        ])]);
        let buf = CurveLookupBuffer::build(&set, 16).unwrap();
        for i in 0..buf.total_points() {
            assert!((buf.tangent(i).length() - 1.0).abs() < 1e-5);
            assert!((buf.normal(i).length() - 1.0).abs() < 1e-5);
            assert!(buf.tangent(i).dot(buf.normal(i)).abs() < 1e-5);
        }
    }

    #[test]
    fn empty_input_is_a_data_error() {
        assert!(matches!(
            CurveLookupBuffer::build(&CurveSet::default(), 512),
            Err(DataError::NoCurves)
        ));
        let set = CurveSet::new(vec![curve(&[[0.0; 3]]), curve(&[])]);
        assert!(matches!(
            CurveLookupBuffer::build(&set, 512),
            Err(DataError::EmptyCurve { index: 1 })
        ));
    }
}
