//! Twisted-fiber yarn geometry synthesis.
//!
//! Turns a few base curves into many plies that spiral around them, with
//! topology built once and positions evaluated per vertex every frame.
//!
//! Main components, leaves first:
//! - [`curve_source`] - curve files (JSON / BCC) and known sources.
//! - [`curve_store`] - the fixed-width lookup buffer packing every point.
//! - [`frame`] - parallel-transport frames along the curves.
//! - [`classifier`] - fiber type per ply.
//! - [`topology`] - vertex metadata and line / tube index buffers.
//! - [`params`] - the parameter snapshot and its control-panel declarations.
//! - [`evaluator`] - the per-vertex position function.
//! - [`shading`] - per-vertex color modes.
//! - [`animation`] - periodic parameter oscillation.
//! - [`loader`] - background loading with stale-result rejection.
//! - [`binding`] - rebuild-vs-update glue for a render-loop host.
//! - [`config`] - host settings loaded from JSON.
//! - [`error`] - error types.
//! - [`types`] - shared aliases and small enums.

pub mod animation;
pub mod binding;
pub mod classifier;
pub mod config;
pub mod curve_source;
pub mod curve_store;
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod loader;
pub mod params;
pub mod shading;
pub mod topology;
pub mod types;

pub use binding::{FiberBinding, FiberMesh, TickReport};
pub use config::YarnConfig;
pub use error::{DataError, FiberError, FiberResult};
pub use params::{FiberParams, ParamId, ParamValue, SetOutcome};
