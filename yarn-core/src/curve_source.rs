//! Curve data ingestion.
//!
//! Curves arrive either as JSON (`{ "curves": [{ "points": [[x, y, z], ..],
//! "closed": bool }] }`) or as binary `.bcc` hair-curve files. Both end up
//! as a validated [`CurveSet`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// One base curve: an ordered list of points, optionally closed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub points: Vec<[f32; 3]>,
    #[serde(default, alias = "loop")]
    pub closed: bool,
}

/// All curves of one source, in file order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveSet {
    pub curves: Vec<Curve>,
}

impl CurveSet {
    pub fn new(curves: Vec<Curve>) -> Self {
        Self { curves }
    }

    /// Parses and validates the JSON curve format.
    ///
    /// Extra per-curve fields written by older exporters (`startIndex`,
    /// `count`) are ignored; `loop` is accepted as a synonym of `closed`.
    pub fn from_json_str(text: &str) -> Result<Self, DataError> {
        let set: CurveSet = serde_json::from_str(text)?;
        set.validate()?;
        Ok(set)
    }

    /// Parses and validates a binary `.bcc` file.
    ///
    /// Layout (little-endian): a 64-byte header (`"BCC"`, `0x44`, `"C0"`,
    /// dimensions = 3, up-dimension, `u64` curve count, `u64` control point
    /// count, 40 bytes of file info), then per curve an `i32` point count,
    /// negative for closed loops, followed by `count * 3` `f32` values.
    pub fn from_bcc_bytes(bytes: &[u8]) -> Result<Self, DataError> {
        let mut reader = ByteReader::new(bytes);

        let sign = reader.take(3)?;
        let byte_count = reader.read_u8()?;
        let curve_type = reader.take(2)?;
        let dimensions = reader.read_u8()?;
        let _up_dimension = reader.read_u8()?;
        let curve_count = reader.read_u64()?;
        let total_points = reader.read_u64()?;
        let _file_info = reader.take(40)?;

        if sign != b"BCC" || byte_count != 0x44 || curve_type != b"C0" || dimensions != 3 {
            return Err(DataError::Bcc(
                "unsupported header (expected BCC 0x44 C0 with 3 dimensions)".into(),
            ));
        }

        // Counts larger than the file can hold would only trigger huge allocations.
        let max_points = (bytes.len() / 12) as u64;
        let max_curves = (bytes.len() / 4) as u64;
        if total_points > max_points || curve_count > max_curves {
            return Err(DataError::Bcc(format!(
                "header claims {curve_count} curves / {total_points} points in {} bytes",
                bytes.len()
            )));
        }

        let mut curves = Vec::with_capacity(curve_count as usize);
        for _ in 0..curve_count {
            let raw_count = reader.read_i32()?;
            let closed = raw_count < 0;
            let count = raw_count.unsigned_abs() as usize;

            let mut points = Vec::with_capacity(count);
            for _ in 0..count {
                let x = reader.read_f32()?;
                let y = reader.read_f32()?;
                let z = reader.read_f32()?;
                points.push([x, y, z]);
            }
            curves.push(Curve { points, closed });
        }

        let set = CurveSet { curves };
        set.validate()?;
        Ok(set)
    }

    /// Loads a curve file, choosing the parser from the extension.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let io_err = |source| DataError::Io {
            path: path.to_path_buf(),
            source,
        };

        match extension.as_deref() {
            Some("json") => {
                let text = fs::read_to_string(path).map_err(io_err)?;
                Self::from_json_str(&text)
            }
            Some("bcc") => {
                let bytes = fs::read(path).map_err(io_err)?;
                Self::from_bcc_bytes(&bytes)
            }
            _ => Err(DataError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Rejects empty sources, empty curves and non-finite coordinates.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.curves.is_empty() {
            return Err(DataError::NoCurves);
        }
        for (index, curve) in self.curves.iter().enumerate() {
            if curve.points.is_empty() {
                return Err(DataError::EmptyCurve { index });
            }
            if let Some(point) = curve
                .points
                .iter()
                .position(|p| p.iter().any(|c| !c.is_finite()))
            {
                return Err(DataError::NonFinite {
                    curve: index,
                    point,
                });
            }
        }
        Ok(())
    }

    /// Number of points over all curves.
    pub fn total_points(&self) -> usize {
        self.curves.iter().map(|c| c.points.len()).sum()
    }
}

/// Curve files shipped with the host application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownCurve {
    #[default]
    Thread,
    Glove,
    Fiber,
}

impl KnownCurve {
    pub const ALL: [KnownCurve; 3] = [KnownCurve::Thread, KnownCurve::Glove, KnownCurve::Fiber];

    pub fn file_name(self) -> &'static str {
        match self {
            KnownCurve::Thread => "1_thread.json",
            KnownCurve::Glove => "glove.json",
            KnownCurve::Fiber => "fiber.json",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.file_name() == name || k.label() == name)
    }

    pub fn label(self) -> &'static str {
        match self {
            KnownCurve::Thread => "thread",
            KnownCurve::Glove => "glove",
            KnownCurve::Fiber => "fiber",
        }
    }
}

/// Where a load request takes its curves from.
#[derive(Clone, Debug)]
pub enum CurveSource {
    /// A named file inside the configured data directory.
    Known(KnownCurve),
    /// An explicit `.json` or `.bcc` path.
    Path(PathBuf),
    /// Curves already in memory, supplied by the host.
    Inline(Arc<CurveSet>),
}

impl CurveSource {
    /// Reads and validates the curves. Blocking; the loader calls this off
    /// the frame thread.
    pub fn fetch(&self, data_dir: &Path) -> Result<CurveSet, DataError> {
        match self {
            CurveSource::Known(known) => CurveSet::load(&data_dir.join(known.file_name())),
            CurveSource::Path(path) => CurveSet::load(path),
            CurveSource::Inline(set) => {
                set.validate()?;
                Ok(set.as_ref().clone())
            }
        }
    }

    /// Short human-readable name for logs.
    pub fn describe(&self) -> String {
        match self {
            CurveSource::Known(known) => known.file_name().to_string(),
            CurveSource::Path(path) => path.display().to_string(),
            CurveSource::Inline(set) => format!("inline ({} curves)", set.curves.len()),
        }
    }
}

impl From<KnownCurve> for CurveSource {
    fn from(known: KnownCurve) -> Self {
        CurveSource::Known(known)
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DataError> {
        let end = self.pos + n;
        let Some(slice) = self.bytes.get(self.pos..end) else {
            return Err(DataError::Bcc(format!(
                "unexpected end of file at byte {} (wanted {n} more)",
                self.pos
            )));
        };
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DataError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, DataError> {
        Ok(self.take_array::<1>()?[0])
    }

    fn read_i32(&mut self) -> Result<i32, DataError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, DataError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    fn read_f32(&mut self) -> Result<f32, DataError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }
}
