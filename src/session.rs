//! # Session
//!
//! Punto d'ingresso della libreria: tiene il working set corrente, l'esito
//! dell'ultimo run e gli handle pubblicati.
//!
//! ## Flusso:
//! 1. `intake`: sostituisce il working set, invalida risultati e handle
//!    precedenti, avvia le preview in background
//! 2. `optimize`: esegue il `BatchOptimizer` su uno snapshot del working set
//!    e pubblica gli artifact prodotti
//! 3. `publication`: handle per-file ed eventuale bundle
//!
//! Mentre un run è attivo, sia `intake` che un nuovo `optimize` vengono
//! rifiutati con `OptimizeError::RunInProgress`.

use crate::{
    archive::Archiver,
    config::CompressionConfig,
    error::OptimizeError,
    events::{EventSink, SessionEvent},
    file_manager::{PreviewDescriptor, RawFile, WorkingSet},
    image_processor::{Compressor, ImageProcessor},
    optimizer::batch::{BatchOptimizer, RunOutcome},
    publisher::{Publication, ResultPublisher},
};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Holds the running flag for as long as a run lasts
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Result<Self, OptimizeError> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| Self { running })
            .map_err(|_| OptimizeError::RunInProgress)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

struct SessionState {
    working_set: WorkingSet,
    outcome: Option<RunOutcome>,
    publication: Publication,
    previews: Vec<JoinHandle<()>>,
    last_generation: u64,
}

/// One interactive optimization session
pub struct Session {
    optimizer: BatchOptimizer<dyn Compressor>,
    publisher: ResultPublisher,
    sink: Arc<dyn EventSink>,
    running: AtomicBool,
    loaded: AtomicUsize,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(
        compressor: Arc<dyn Compressor>,
        archiver: Arc<dyn Archiver>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let publisher = ResultPublisher::new(archiver, Arc::clone(&sink));
        let publication = publisher.unpublished();

        Self {
            optimizer: BatchOptimizer::new(compressor, Arc::clone(&sink)),
            publisher,
            sink,
            running: AtomicBool::new(false),
            loaded: AtomicUsize::new(0),
            state: Mutex::new(SessionState {
                working_set: WorkingSet::empty(),
                outcome: None,
                publication,
                previews: Vec::new(),
                last_generation: 0,
            }),
        }
    }

    /// Replace the working set with `files`.
    ///
    /// Previous artifacts and handles are dropped before the new set becomes
    /// visible. Preview decoding runs in background tasks and only reports
    /// through the event sink.
    pub async fn intake(&self, files: Vec<RawFile>) -> Result<Vec<PreviewDescriptor>, OptimizeError> {
        let mut state = self.state.lock().await;
        if self.running.load(Ordering::SeqCst) {
            warn!("Intake rejected: a run is in progress");
            return Err(OptimizeError::RunInProgress);
        }

        for handle in state.previews.drain(..) {
            handle.abort();
        }

        state.last_generation += 1;
        let generation = state.last_generation;
        let working_set = WorkingSet::new(generation, files);
        let previews = working_set.previews();

        state.outcome = None;
        state.publication = self.publisher.clear();
        self.loaded.store(working_set.len(), Ordering::SeqCst);

        info!(
            "Loaded {} files ({} bytes) as batch #{}",
            working_set.len(),
            working_set.total_bytes(),
            generation
        );
        self.sink.on_event(&SessionEvent::BatchLoaded {
            generation,
            files: previews.clone(),
            optimize_enabled: !working_set.is_empty(),
        });

        state.previews = working_set
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let content = candidate.content.clone();
                let sink = Arc::clone(&self.sink);
                tokio::spawn(async move {
                    let probed = tokio::task::spawn_blocking(move || ImageProcessor::probe(&content))
                        .await
                        .map_err(|e| e.to_string())
                        .and_then(|r| r.map_err(|e| e.to_string()));

                    let event = match probed {
                        Ok(preview) => SessionEvent::PreviewReady {
                            generation,
                            index,
                            width: preview.width,
                            height: preview.height,
                            format: preview.format,
                        },
                        Err(reason) => {
                            debug!("Preview unavailable for file #{}: {}", index, reason);
                            SessionEvent::PreviewUnavailable {
                                generation,
                                index,
                                reason,
                            }
                        }
                    };
                    sink.on_event(&event);
                })
            })
            .collect();

        state.working_set = working_set;
        Ok(previews)
    }

    /// Whether an `optimize` call would start a run right now
    pub fn can_optimize(&self) -> bool {
        !self.running.load(Ordering::SeqCst) && self.loaded.load(Ordering::SeqCst) > 0
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the current working set through the compressor and publish the
    /// artifacts it produced, including the partial prefix of a failed run.
    pub async fn optimize(&self, config: &CompressionConfig) -> Result<RunOutcome, OptimizeError> {
        let (_guard, working_set) = {
            let mut state = self.state.lock().await;
            let guard = RunGuard::acquire(&self.running)?;
            // results of a previous run on this set are gone before the new one starts
            state.outcome = None;
            if !state.publication.is_empty() {
                state.publication = self.publisher.clear();
            }
            (guard, state.working_set.clone())
        };

        let outcome = self.optimizer.optimize(&working_set, config).await;

        let mut state = self.state.lock().await;
        state.publication = self.publisher.publish(Arc::clone(&outcome.artifacts));
        state.outcome = Some(outcome.clone());

        Ok(outcome)
    }

    /// Handles for the artifacts of the last run
    pub async fn publication(&self) -> Publication {
        self.state.lock().await.publication.clone()
    }

    pub async fn outcome(&self) -> Option<RunOutcome> {
        self.state.lock().await.outcome.clone()
    }

    pub async fn working_set(&self) -> WorkingSet {
        self.state.lock().await.working_set.clone()
    }

    /// Wait until every preview task of the current batch has reported
    pub async fn settle_previews(&self) {
        let handles = std::mem::take(&mut self.state.lock().await.previews);
        for result in join_all(handles).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!("Preview task failed: {}", e);
                }
            }
        }
    }
}
