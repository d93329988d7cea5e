//! Glue between the synthesized geometry and a render-loop host.
//!
//! [`FiberBinding`] separates the two kinds of change:
//! - **structural** (curve data, fiber count, resolution, radial segments,
//!   render mode, classifier policy) sets a dirty flag and the next tick
//!   rebuilds topology and metadata;
//! - **continuous** (everything else) only changes the parameter snapshot
//!   the evaluator reads, reusing every buffer.
//!
//! Manual settings and the animated per-frame snapshot are kept apart: an
//! oscillating channel overrides its parameter in the frame snapshot only,
//! so switching it back to static restores the last manual value.
//!
//! Curves and geometry are published together in one [`FiberMesh`] behind
//! an `Arc`, so a host never sees new curves with old topology. A failed
//! load or rebuild leaves the published mesh untouched.

use std::sync::Arc;

use tracing::{info, warn};

use crate::animation::AnimationDriver;
use crate::classifier::{ClassifierPolicy, assign_fiber_types};
use crate::config::YarnConfig;
use crate::curve_source::CurveSource;
use crate::curve_store::CurveLookupBuffer;
use crate::error::{FiberError, FiberResult};
use crate::evaluator::{EvalContext, evaluate_into};
use crate::loader::{CurveLoader, Generation, LoadOutcome, LoadedCurves};
use crate::params::{FiberParams, ParamId, ParamValue, SetOutcome, StructuralKey};
use crate::topology::{FiberGeometry, PlyMesh, build_geometry};
use crate::types::PlyIndex;

/// Curves and the topology built from them, published as one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct FiberMesh {
    /// Counts published rebuilds, starting at 1.
    pub revision: u64,
    pub curves: Arc<LoadedCurves>,
    pub geometry: FiberGeometry,
    pub key: StructuralKey,
}

impl FiberMesh {
    pub fn lookup(&self) -> &CurveLookupBuffer {
        &self.curves.lookup
    }
}

/// Evaluated output of one ply, reused across frames.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlyBuffers {
    pub ply: PlyIndex,
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
}

impl PlyBuffers {
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }
}

/// What happened during one [`FiberBinding::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    /// Generation of curve data that finished loading this tick.
    pub loaded: Option<Generation>,
    pub rebuilt: bool,
    /// Number of parameters written by the animation driver.
    pub animated: usize,
    /// Vertices evaluated this tick.
    pub evaluated: usize,
    /// A load or rebuild failure; the previous mesh is still published.
    pub error: Option<FiberError>,
}

/// Classifier policy selected by the `random_fiber_type` toggle.
pub fn classifier_policy(params: &FiberParams) -> ClassifierPolicy {
    if params.random_fiber_type {
        ClassifierPolicy::Random
    } else {
        ClassifierPolicy::ByRatio
    }
}

/// Builds topology for `curves` under the structural part of `params`.
///
/// ### Parameters
/// - `curves` - Loaded curve data; shared with the returned mesh.
/// - `params` - Only the structural fields are read.
/// - `seed` - Seed for random fiber types, see [`assign_fiber_types`].
/// - `revision` - Stamp for the returned mesh.
///
/// ### Returns
/// The mesh, or [`FiberError::Topology`] for unusable counts.
pub fn build_mesh(
    curves: Arc<LoadedCurves>,
    params: &FiberParams,
    seed: Option<u64>,
    revision: u64,
) -> FiberResult<FiberMesh> {
    let request = params.topology_request();
    request.validate()?;

    let types = assign_fiber_types(classifier_policy(params), request.fiber_count, seed);
    let geometry = build_geometry(&curves.lookup, request, &types)?;

    Ok(FiberMesh {
        revision,
        curves,
        geometry,
        key: params.structural_key(),
    })
}

pub struct FiberBinding {
    config: YarnConfig,
    loader: CurveLoader,
    /// Last manual settings.
    params: FiberParams,
    /// `params` with the oscillating channels applied; what was evaluated.
    frame: FiberParams,
    driver: AnimationDriver,
    /// Newest loaded curves; may be ahead of the published mesh.
    curves: Option<Arc<LoadedCurves>>,
    mesh: Option<Arc<FiberMesh>>,
    buffers: Vec<PlyBuffers>,
    dirty: bool,
    revision: u64,
}

impl FiberBinding {
    /// Creates an empty binding. Nothing is loaded until
    /// [`FiberBinding::select_source`] is called.
    pub fn new(config: YarnConfig) -> Self {
        let loader = CurveLoader::new(config.data_dir.clone(), config.lookup_width);
        let mut params = config.params;
        params.sanitize();
        Self {
            config,
            loader,
            params,
            frame: params,
            driver: AnimationDriver::with_defaults(),
            curves: None,
            mesh: None,
            buffers: Vec::new(),
            dirty: false,
            revision: 0,
        }
    }

    /// Starts loading the configured startup source.
    pub fn start(&mut self) -> FiberResult<Generation> {
        self.select_source(self.config.source)
    }

    /// Switches to another curve source. The current mesh stays published
    /// until the new data has loaded and been rebuilt.
    pub fn select_source(&mut self, source: impl Into<CurveSource>) -> FiberResult<Generation> {
        self.loader.request(source.into())
    }

    pub fn config(&self) -> &YarnConfig {
        &self.config
    }

    /// Manual settings, without animation.
    pub fn params(&self) -> &FiberParams {
        &self.params
    }

    /// Snapshot used by the last evaluation, animation included.
    pub fn frame_params(&self) -> &FiberParams {
        &self.frame
    }

    pub fn driver(&self) -> &AnimationDriver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut AnimationDriver {
        &mut self.driver
    }

    /// Whether the next tick will rebuild.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_pending()
    }

    /// Sets one parameter from the control panel.
    pub fn set_param(&mut self, id: ParamId, value: ParamValue) -> SetOutcome {
        let before = self.params.structural_key();
        let outcome = self.params.set(id, value);
        if self.params.structural_key() != before {
            self.dirty = true;
        }
        outcome
    }

    /// Replaces the whole parameter snapshot, clamping it to bounds.
    ///
    /// ### Returns
    /// How many fields had to be clamped.
    pub fn apply_snapshot(&mut self, snapshot: FiberParams) -> usize {
        let before = self.params.structural_key();
        self.params = snapshot;
        let clamped = self.params.sanitize();
        if self.params.structural_key() != before {
            self.dirty = true;
        }
        clamped
    }

    /// Rebuilds from the newest curves and publishes the result.
    ///
    /// On failure the previous mesh stays published and the dirty flag is
    /// cleared, so the error is reported once rather than every frame.
    pub fn rebuild(&mut self) -> FiberResult<Arc<FiberMesh>> {
        let curves = self.curves.clone().ok_or(FiberError::NotLoaded)?;
        self.dirty = false;

        let mesh = match build_mesh(curves, &self.params, self.config.classifier_seed, self.revision + 1)
        {
            Ok(mesh) => Arc::new(mesh),
            Err(err) => {
                warn!(%err, "rebuild aborted, keeping previous geometry");
                return Err(err);
            }
        };

        self.revision = mesh.revision;
        self.buffers.resize_with(mesh.geometry.plies.len(), PlyBuffers::default);
        for (buffers, ply) in self.buffers.iter_mut().zip(&mesh.geometry.plies) {
            buffers.ply = ply.ply;
        }

        info!(
            revision = mesh.revision,
            source = %mesh.curves.source,
            mode = ?mesh.geometry.mode(),
            plies = mesh.geometry.plies.len(),
            vertices = mesh.geometry.vertex_count(),
            "published fiber geometry"
        );

        self.mesh = Some(Arc::clone(&mesh));
        Ok(mesh)
    }

    /// Per-frame entry point.
    ///
    /// Polls the loader, rebuilds if something structural changed, advances
    /// the animation and evaluates every vertex into the ply buffers.
    ///
    /// ### Parameters
    /// - `elapsed` - Seconds since the host started its clock.
    pub fn tick(&mut self, elapsed: f64) -> TickReport {
        let mut report = TickReport::default();

        match self.loader.poll() {
            Some(LoadOutcome::Ready(loaded)) => {
                report.loaded = Some(loaded.generation);
                self.curves = Some(Arc::new(loaded));
                self.dirty = true;
            }
            Some(LoadOutcome::Failed { error, .. }) => {
                report.error = Some(error.into());
            }
            None => {}
        }

        if self.dirty && self.curves.is_some() {
            match self.rebuild() {
                Ok(_) => report.rebuilt = true,
                Err(err) => report.error = Some(err),
            }
        }

        let mut frame = self.params;
        report.animated = self.driver.apply(elapsed, &mut frame);
        self.frame = frame;
        report.evaluated = self.evaluate(elapsed as f32);
        report
    }

    /// Applies a control-panel snapshot, then ticks.
    pub fn update(&mut self, elapsed: f64, snapshot: FiberParams) -> TickReport {
        self.apply_snapshot(snapshot);
        self.tick(elapsed)
    }

    fn evaluate(&mut self, time: f32) -> usize {
        let Some(mesh) = self.mesh.clone() else {
            return 0;
        };
        let ctx = EvalContext {
            lookup: mesh.lookup(),
            params: &self.frame,
            mode: mesh.geometry.mode(),
            time,
        };

        let mut evaluated = 0;
        for (ply, buffers) in mesh.geometry.plies.iter().zip(self.buffers.iter_mut()) {
            evaluate_into(&ctx, &ply.vertices, &mut buffers.positions, &mut buffers.colors);
            evaluated += ply.vertices.len();
        }
        evaluated
    }

    /// The published mesh, if any rebuild succeeded yet.
    pub fn mesh(&self) -> Option<Arc<FiberMesh>> {
        self.mesh.clone()
    }

    pub fn buffers(&self) -> &[PlyBuffers] {
        &self.buffers
    }

    /// Lookup buffer of the published mesh, for texture upload.
    pub fn lookup(&self) -> Option<&CurveLookupBuffer> {
        self.mesh.as_deref().map(FiberMesh::lookup)
    }

    /// Ply meshes and their evaluated buffers, filtered by `visible_ply`.
    pub fn visible_plies(&self) -> impl Iterator<Item = (&PlyMesh, &PlyBuffers)> {
        let visible = self.params.visible_ply;
        self.mesh
            .iter()
            .flat_map(|mesh| mesh.geometry.plies.iter())
            .zip(self.buffers.iter())
            .filter(move |(ply, _)| visible < 0 || ply.ply as i64 == i64::from(visible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve_source::{Curve, CurveSet};
    use crate::types::RenderMode;
    use std::thread;
    use std::time::{Duration, Instant};

    fn inline() -> CurveSource {
        CurveSource::Inline(Arc::new(CurveSet::new(vec![Curve {
            points: vec![[0.0, 0.0, 0.0], [0.0, 0.5, 1.0], [0.0, 0.0, 2.0]],
            closed: false,
        }])))
    }

    fn binding() -> FiberBinding {
        let mut config = YarnConfig::default();
        config.params.resolution = 8;
        config.params.radial_segments = 6;
        config.params.fiber_count = 4;
        FiberBinding::new(config)
    }

    fn tick_until_loaded(binding: &mut FiberBinding) -> TickReport {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let report = binding.tick(0.0);
            if report.loaded.is_some() || report.error.is_some() {
                return report;
            }
            assert!(Instant::now() < deadline, "load did not finish");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn loaded() -> FiberBinding {
        let mut b = binding();
        b.select_source(inline()).unwrap();
        let report = tick_until_loaded(&mut b);
        assert!(report.rebuilt, "{report:?}");
        b
    }

    #[test]
    fn nothing_happens_before_a_load() {
        let mut b = binding();
        let report = b.tick(1.0);
        assert!(!report.rebuilt);
        assert_eq!(report.evaluated, 0);
        assert!(b.mesh().is_none());
        assert!(matches!(b.rebuild(), Err(FiberError::NotLoaded)));
    }

    #[test]
    fn load_publishes_mesh_and_fills_buffers() {
        let b = loaded();
        let mesh = b.mesh().unwrap();
        assert_eq!(mesh.revision, 1);
        assert_eq!(mesh.geometry.plies.len(), 4);
        assert_eq!(b.lookup().unwrap().total_points(), 3);

        assert_eq!(b.buffers().len(), 4);
        for (ply, buffers) in mesh.geometry.plies.iter().zip(b.buffers()) {
            assert_eq!(buffers.ply, ply.ply);
            assert_eq!(buffers.positions.len(), 8 * 6);
            assert!(buffers.positions.iter().flatten().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn continuous_change_reuses_topology() {
        let mut b = loaded();
        let before = b.mesh().unwrap();
        let positions = b.buffers()[0].positions.clone();

        assert_eq!(b.set_param(ParamId::TwistRate, ParamValue::Float(7.0)), SetOutcome::Applied);
        assert!(!b.is_dirty());
        let report = b.tick(0.5);

        assert!(!report.rebuilt);
        assert!(Arc::ptr_eq(&before, &b.mesh().unwrap()));
        assert_ne!(b.buffers()[0].positions, positions);
    }

    #[test]
    fn structural_change_rebuilds() {
        let mut b = loaded();
        b.set_param(ParamId::FiberCount, ParamValue::Int(2));
        assert!(b.is_dirty());
        let report = b.tick(0.0);

        assert!(report.rebuilt);
        let mesh = b.mesh().unwrap();
        assert_eq!(mesh.revision, 2);
        assert_eq!(mesh.geometry.plies.len(), 2);
        assert_eq!(b.buffers().len(), 2);

        let mut snapshot = *b.params();
        snapshot.render_mode = RenderMode::Line;
        b.update(0.0, snapshot);
        assert_eq!(b.mesh().unwrap().geometry.mode(), RenderMode::Line);
    }

    #[test]
    fn failed_load_keeps_previous_mesh() {
        let mut b = loaded();
        let before = b.mesh().unwrap();

        b.select_source(CurveSource::Path("/no/such/curves.json".into())).unwrap();
        let report = tick_until_loaded(&mut b);

        assert!(matches!(report.error, Some(FiberError::Data(_))));
        assert!(!report.rebuilt);
        assert!(Arc::ptr_eq(&before, &b.mesh().unwrap()));
    }

    #[test]
    fn topology_errors_abort_the_build() {
        let curves = Arc::new(LoadedCurves {
            generation: 1,
            source: "test".into(),
            lookup: crate::loader::load_curves(&inline(), ".".as_ref(), 8).unwrap(),
        });
        let params = FiberParams {
            fiber_count: 0,
            ..FiberParams::default()
        };
        assert!(matches!(
            build_mesh(curves, &params, None, 1),
            Err(FiberError::Topology { what: "fiber count", .. })
        ));
    }

    #[test]
    fn visible_ply_filters_output() {
        let mut b = loaded();
        assert_eq!(b.visible_plies().count(), 4);
        b.set_param(ParamId::VisiblePly, ParamValue::Int(2));
        let visible: Vec<_> = b.visible_plies().map(|(ply, _)| ply.ply).collect();
        assert_eq!(visible, vec![2]);
    }

    #[test]
    fn oscillating_channel_drives_params_each_tick() {
        let mut b = loaded();
        b.driver_mut().set_oscillating(ParamId::RadiusMax, true);
        b.set_param(ParamId::RadiusMax, ParamValue::Float(0.02));
        let report = b.tick(2.5);
        assert_eq!(report.animated, 1);
        assert!((b.frame_params().radius_max - 0.1).abs() < 1e-6);
    }

    #[test]
    fn static_channel_restores_the_manual_value() {
        let mut b = loaded();
        b.set_param(ParamId::RadiusMax, ParamValue::Float(0.02));
        b.tick(3.0);
        let manual = b.buffers()[0].positions.clone();

        b.driver_mut().set_oscillating(ParamId::RadiusMax, true);
        b.tick(2.5);
        assert!((b.frame_params().radius_max - 0.1).abs() < 1e-6);
        assert_eq!(b.params().radius_max, 0.02);
        assert_ne!(b.buffers()[0].positions, manual);

        b.driver_mut().set_oscillating(ParamId::RadiusMax, false);
        let report = b.tick(3.0);
        assert_eq!(report.animated, 0);
        assert_eq!(b.params().radius_max, 0.02);
        assert_eq!(b.frame_params().radius_max, 0.02);
        assert_eq!(b.buffers()[0].positions, manual);
    }

    #[test]
    fn seeded_random_types_are_stable_across_rebuilds() {
        let mut b = loaded();
        let types = |b: &FiberBinding| -> Vec<_> {
            b.mesh().unwrap().geometry.plies.iter().map(|p| p.fiber_type).collect()
        };
        let first = types(&b);
        b.rebuild().unwrap();
        assert_eq!(first, types(&b));
    }
}
