//! Error types for yarn geometry synthesis.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for yarn operations.
pub type FiberResult<T> = Result<T, FiberError>;

/// Problems with the curve data itself: missing, malformed or empty.
#[derive(Debug, Error)]
pub enum DataError {
    /// The source holds no curves at all.
    #[error("curve source contains no curves")]
    NoCurves,

    /// A curve without a single point.
    #[error("curve {index} has no points")]
    EmptyCurve {
        /// Position of the curve in file order.
        index: usize,
    },

    /// A coordinate that is NaN or infinite.
    #[error("curve {curve} has a non-finite coordinate at point {point}")]
    NonFinite {
        /// Curve index in file order.
        curve: usize,
        /// Point index inside the curve.
        point: usize,
    },

    /// More points than a lookup buffer can address.
    #[error("{0} curve points exceed the lookup buffer index range")]
    TooManyPoints(usize),

    /// JSON that does not match `{ curves: [{ points, closed }] }`.
    #[error("malformed curve JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary `.bcc` file that fails header or length checks.
    #[error("malformed BCC file: {0}")]
    Bcc(String),

    /// A file whose extension is neither `.json` nor `.bcc`.
    #[error("unsupported curve file {0:?}")]
    UnsupportedFormat(PathBuf),

    /// The file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}

/// Errors surfaced to the render-loop host.
///
/// None of these are fatal: a failed load or rebuild leaves the previously
/// published geometry in place.
#[derive(Debug, Error)]
pub enum FiberError {
    /// Curve data could not be used.
    #[error(transparent)]
    Data(#[from] DataError),

    /// A structural count is too small to build geometry.
    #[error("{what} must be at least {min}, got {actual}")]
    Topology {
        /// Which count was rejected.
        what: &'static str,
        /// Smallest accepted value.
        min: u32,
        /// Value that was requested.
        actual: u32,
    },

    /// A rebuild was requested before any curve data finished loading.
    #[error("no curve data has been loaded yet")]
    NotLoaded,

    /// The configuration file could not be read.
    #[error("failed to read config {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for [`crate::config::YarnConfig`].
    #[error("invalid config: {0}")]
    Config(#[source] serde_json::Error),

    /// The background loader thread could not be started or went away.
    #[error("curve loader unavailable: {0}")]
    Loader(String),
}
