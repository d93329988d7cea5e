//! Background curve loading with supersession.
//!
//! Every [`CurveLoader::request`] gets a new [`Generation`] and runs on its
//! own thread. Results come back over a channel and are drained without
//! blocking by [`CurveLoader::poll`]; anything older than the latest
//! request is dropped, so a slow load can never overwrite a newer one.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::curve_source::CurveSource;
use crate::curve_store::CurveLookupBuffer;
use crate::error::{DataError, FiberError, FiberResult};

/// Monotonic load request token.
pub type Generation = u64;

/// A fully built lookup buffer and where it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedCurves {
    pub generation: Generation,
    pub source: String,
    pub lookup: CurveLookupBuffer,
}

/// Result of the most recent request.
#[derive(Debug)]
pub enum LoadOutcome {
    Ready(LoadedCurves),
    Failed {
        generation: Generation,
        error: DataError,
    },
}

impl LoadOutcome {
    pub fn generation(&self) -> Generation {
        match self {
            LoadOutcome::Ready(loaded) => loaded.generation,
            LoadOutcome::Failed { generation, .. } => *generation,
        }
    }
}

struct LoadMessage {
    generation: Generation,
    source: String,
    result: Result<CurveLookupBuffer, DataError>,
}

/// Fetches curves and packs them. Blocking.
pub fn load_curves(
    source: &CurveSource,
    data_dir: &Path,
    width: u32,
) -> Result<CurveLookupBuffer, DataError> {
    let set = source.fetch(data_dir)?;
    CurveLookupBuffer::build(&set, width)
}

pub struct CurveLoader {
    data_dir: PathBuf,
    width: u32,
    stack_size: Option<usize>,
    latest: Generation,
    settled: Generation,
    tx: Sender<LoadMessage>,
    rx: Receiver<LoadMessage>,
}

impl CurveLoader {
    /// ### Parameters
    /// - `data_dir` - Directory known curve names are resolved against.
    /// - `width` - Lookup buffer width for every load.
    pub fn new(data_dir: impl Into<PathBuf>, width: u32) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            data_dir: data_dir.into(),
            width,
            stack_size: None,
            latest: 0,
            settled: 0,
            tx,
            rx,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Stack size of future worker threads; `None` uses the platform default.
    pub fn set_stack_size(&mut self, bytes: Option<usize>) {
        self.stack_size = bytes;
    }

    /// Generation of the newest request, `0` before the first one.
    pub fn latest(&self) -> Generation {
        self.latest
    }

    /// Whether the newest request has not reported back yet.
    pub fn is_pending(&self) -> bool {
        self.settled < self.latest
    }

    /// Starts loading `source` on a worker thread, superseding any request
    /// still in flight.
    ///
    /// ### Returns
    /// The generation of the new request, or [`FiberError::Loader`] if the
    /// thread could not be spawned.
    pub fn request(&mut self, source: CurveSource) -> FiberResult<Generation> {
        let generation = self.latest + 1;
        let data_dir = self.data_dir.clone();
        let width = self.width;
        let tx = self.tx.clone();

        debug!(generation, source = %source.describe(), "requesting curve load");

        let mut builder = thread::Builder::new().name(format!("curve-load-{generation}"));
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        builder
            .spawn(move || {
                let result = load_curves(&source, &data_dir, width);
                // The loader may have been dropped meanwhile; nothing to report to.
                let _ = tx.send(LoadMessage {
                    generation,
                    source: source.describe(),
                    result,
                });
            })
            .map_err(|e| FiberError::Loader(e.to_string()))?;

        self.latest = generation;
        Ok(generation)
    }

    /// Drains finished loads without blocking.
    ///
    /// ### Returns
    /// The outcome of the newest request if it finished since the last
    /// poll; stale results are discarded.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        let mut outcome = None;
        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    if let Some(current) = self.accept(message) {
                        outcome = Some(current);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        outcome
    }

    /// Blocks until the newest request finishes or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> Option<LoadOutcome> {
        let deadline = Instant::now() + timeout;
        while self.is_pending() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(message) => {
                    if let Some(current) = self.accept(message) {
                        return Some(current);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        None
    }

    fn accept(&mut self, message: LoadMessage) -> Option<LoadOutcome> {
        let LoadMessage {
            generation,
            source,
            result,
        } = message;

        if generation != self.latest {
            debug!(generation, latest = self.latest, %source, "discarding superseded curve load");
            return None;
        }
        self.settled = generation;

        match result {
            Ok(lookup) => {
                info!(
                    generation,
                    %source,
                    points = lookup.total_points(),
                    curves = lookup.spans().len(),
                    "curve data loaded"
                );
                Some(LoadOutcome::Ready(LoadedCurves {
                    generation,
                    source,
                    lookup,
                }))
            }
            Err(error) => {
                warn!(generation, %source, %error, "curve load failed");
                Some(LoadOutcome::Failed { generation, error })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve_source::{Curve, CurveSet};
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(10);

    fn inline(points: &[[f32; 3]]) -> CurveSource {
        CurveSource::Inline(Arc::new(CurveSet::new(vec![Curve {
            points: points.to_vec(),
            closed: false,
        }])))
    }

    #[test]
    fn inline_source_loads() {
        let mut loader = CurveLoader::new(".", 8);
        let generation = loader.request(inline(&[[0.0; 3], [1.0, 0.0, 0.0]])).unwrap();
        assert!(loader.is_pending());

        match loader.wait(WAIT) {
            Some(LoadOutcome::Ready(loaded)) => {
                assert_eq!(loaded.generation, generation);
                assert_eq!(loaded.lookup.total_points(), 2);
                assert_eq!(loaded.lookup.width(), 8);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!loader.is_pending());
        assert!(loader.poll().is_none());
    }

    #[test]
    fn stale_result_is_discarded() {
        let mut loader = CurveLoader::new(".", 8);
        loader.latest = 2;

        // A superseded load that reports after the newer request was issued.
        let stale = load_curves(&inline(&[[5.0; 3]]), Path::new("."), 8).unwrap();
        loader
            .tx
            .send(LoadMessage {
                generation: 1,
                source: "stale".into(),
                result: Ok(stale),
            })
            .unwrap();
        assert!(loader.poll().is_none());
        assert!(loader.is_pending());

        let fresh = load_curves(&inline(&[[1.0; 3], [2.0; 3]]), Path::new("."), 8).unwrap();
        loader
            .tx
            .send(LoadMessage {
                generation: 2,
                source: "fresh".into(),
                result: Ok(fresh),
            })
            .unwrap();
        match loader.poll() {
            Some(LoadOutcome::Ready(loaded)) => {
                assert_eq!(loaded.generation, 2);
                assert_eq!(loaded.source, "fresh");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn newer_request_supersedes_older() {
        let mut loader = CurveLoader::new(".", 8);
        loader.request(inline(&[[0.0; 3]])).unwrap();
        let second = loader.request(inline(&[[0.0; 3], [0.0, 0.0, 1.0], [0.0, 0.0, 2.0]])).unwrap();

        let outcome = loader.wait(WAIT).expect("load should finish");
        assert_eq!(outcome.generation(), second);
        match outcome {
            LoadOutcome::Ready(loaded) => assert_eq!(loaded.lookup.total_points(), 3),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn failed_spawn_leaves_the_previous_request_current() {
        let mut loader = CurveLoader::new(".", 8);
        let first = loader.request(inline(&[[0.0; 3], [1.0, 0.0, 0.0]])).unwrap();

        loader.set_stack_size(Some(1 << 60));
        assert!(matches!(
            loader.request(inline(&[[0.0; 3]])),
            Err(FiberError::Loader(_))
        ));
        assert_eq!(loader.latest(), first);
        loader.set_stack_size(None);

        match loader.wait(WAIT) {
            Some(LoadOutcome::Ready(loaded)) => assert_eq!(loaded.generation, first),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!loader.is_pending());
    }

    #[test]
    fn failed_load_is_reported() {
        let mut loader = CurveLoader::new("/definitely/not/here", 8);
        let generation = loader.request(CurveSource::Known(Default::default())).unwrap();
        match loader.wait(WAIT) {
            Some(LoadOutcome::Failed { generation: g, error }) => {
                assert_eq!(g, generation);
                assert!(matches!(error, DataError::Io { .. }));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
