//! # Batch Optimizer
//!
//! Comprime i candidati di un `WorkingSet` uno alla volta, nell'ordine del
//! batch, con la stessa `CompressionConfig`.
//!
//! ## Regole del run:
//! - un solo file in compressione alla volta (nessun parallelismo)
//! - fail-fast: al primo errore il run si ferma, i file successivi non
//!   producono artifact
//! - gli artifact sono sempre un prefisso del working set, nello stesso ordine
//! - a fine run la percentuale viene portata a 100 anche dopo un errore

use crate::{
    config::CompressionConfig,
    error::OptimizeError,
    events::{EventSink, SessionEvent},
    file_manager::{Candidate, WorkingSet},
    image_processor::Compressor,
    optimizer::{path_resolver::PathResolver, progress_tracker::{ProgressTracker, RunState}},
    utils::format_bytes,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Compressed output for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Position of the source candidate in the working set
    pub source_index: usize,
    pub derived_name: String,
    pub content: Bytes,
    pub byte_size: u64,
    pub original_size: u64,
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Generation of the working set the run was executed on
    pub generation: u64,
    pub artifacts: Arc<[Artifact]>,
    pub state: RunState,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        !self.state.failed && self.artifacts.len() == self.state.total_count
    }

    /// The failure that stopped the run, as a user-facing error
    pub fn error(&self) -> Option<OptimizeError> {
        self.state.failure.as_ref().map(|failure| OptimizeError::Compression {
            index: failure.index,
            name: failure.name.clone(),
            message: failure.cause.clone(),
        })
    }
}

/// Sequential compressor driving one run at a time
pub struct BatchOptimizer<C: ?Sized> {
    compressor: Arc<C>,
    sink: Arc<dyn EventSink>,
}

impl<C: Compressor + ?Sized> BatchOptimizer<C> {
    pub fn new(compressor: Arc<C>, sink: Arc<dyn EventSink>) -> Self {
        Self { compressor, sink }
    }

    /// Run the whole working set through the compressor
    pub async fn optimize(&self, working_set: &WorkingSet, config: &CompressionConfig) -> RunOutcome {
        let total = working_set.len();
        let mut tracker = ProgressTracker::new(total, Arc::clone(&self.sink));
        let mut artifacts: Vec<Artifact> = Vec::with_capacity(total);

        tracker.emit(SessionEvent::RunStarted {
            generation: working_set.generation(),
            total,
        });
        info!(
            "Optimizing {} files (max {} per file, longest edge {}px, {})",
            total,
            format_bytes(config.max_output_bytes),
            config.max_longest_edge,
            config.output_format
        );

        for (index, candidate) in working_set.iter().enumerate() {
            match self.optimize_one(index, candidate, config, &mut tracker).await {
                Ok(artifact) => {
                    tracker.emit(SessionEvent::FileCompleted {
                        index,
                        name: candidate.name.clone(),
                        derived_name: artifact.derived_name.clone(),
                        original_size: candidate.byte_size,
                        optimized_size: artifact.byte_size,
                        optimized_size_label: format_bytes(artifact.byte_size),
                        message: format!("Optimization complete for \"{}\".", candidate.name),
                    });
                    artifacts.push(artifact);
                    tracker.complete_file();
                }
                Err(cause) => {
                    error!("Error optimizing \"{}\": {}", candidate.name, cause);
                    tracker.fail(index, &candidate.name, cause);
                    break;
                }
            }
        }

        tracker.finish();
        let state = tracker.into_state();
        info!(
            "Run finished: {}/{} files optimized{}",
            state.completed_count,
            state.total_count,
            if state.failed { " (stopped at first error)" } else { "" }
        );

        RunOutcome {
            generation: working_set.generation(),
            artifacts: artifacts.into(),
            state,
        }
    }

    async fn optimize_one(
        &self,
        index: usize,
        candidate: &Candidate,
        config: &CompressionConfig,
        tracker: &mut ProgressTracker,
    ) -> Result<Artifact, String> {
        tracker.begin_file(index, &candidate.name);
        debug!("Compressing #{} {} ({} bytes)", index, candidate.name, candidate.byte_size);

        let content = {
            let mut on_progress = |sub_progress: f64| tracker.report_sub_progress(index, sub_progress);
            self.compressor
                .compress(candidate.content.clone(), config, &mut on_progress)
                .await
                .map_err(|e| e.to_string())?
        };

        Ok(Artifact {
            source_index: index,
            derived_name: PathResolver::derived_name(&candidate.name, config.output_format),
            byte_size: content.len() as u64,
            original_size: candidate.byte_size,
            content,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::CompressionError;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted compressor: fails on chosen contents, otherwise returns
    /// `"out:" + input`, reporting 50% halfway.
    #[derive(Default)]
    pub struct FakeCompressor {
        pub failing: HashSet<Vec<u8>>,
        pub calls: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub seen: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeCompressor {
        pub fn failing_on(contents: &[&str]) -> Self {
            Self {
                failing: contents.iter().map(|c| c.as_bytes().to_vec()).collect(),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Compressor for FakeCompressor {
        async fn compress(
            &self,
            content: Bytes,
            _config: &CompressionConfig,
            progress: &mut (dyn FnMut(f64) + Send),
        ) -> Result<Bytes, CompressionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().unwrap().push(content.to_vec());

            progress(50.0);
            tokio::task::yield_now().await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(&content.to_vec()) {
                return Err(CompressionError::Decode("corrupt test data".to_string()));
            }
            let mut out = b"out:".to_vec();
            out.extend_from_slice(&content);
            Ok(Bytes::from(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeCompressor;
    use super::*;
    use crate::events::testing::RecordingSink;
    use crate::file_manager::RawFile;

    fn working_set(names: &[&str]) -> WorkingSet {
        WorkingSet::new(
            7,
            names
                .iter()
                .map(|n| RawFile::new(n.to_string(), n.as_bytes().to_vec()))
                .collect(),
        )
    }

    fn optimizer(
        compressor: FakeCompressor,
    ) -> (BatchOptimizer<FakeCompressor>, Arc<FakeCompressor>, Arc<RecordingSink>) {
        let compressor = Arc::new(compressor);
        let sink = Arc::new(RecordingSink::default());
        (
            BatchOptimizer::new(Arc::clone(&compressor), sink.clone()),
            compressor,
            sink,
        )
    }

    #[tokio::test]
    async fn test_all_succeed_in_order() {
        let (optimizer, compressor, sink) = optimizer(FakeCompressor::default());
        let set = working_set(&["a.png", "b.JPG", "noext"]);

        let outcome = optimizer.optimize(&set, &CompressionConfig::default()).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.generation, 7);
        let names: Vec<_> = outcome.artifacts.iter().map(|a| a.derived_name.as_str()).collect();
        assert_eq!(names, vec!["a.webp", "b.webp", "noext.webp"]);
        let indices: Vec<_> = outcome.artifacts.iter().map(|a| a.source_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(&outcome.artifacts[0].content[..], b"out:a.png");
        assert_eq!(outcome.artifacts[0].byte_size, 9);
        assert_eq!(outcome.artifacts[0].original_size, 5);

        assert_eq!(outcome.state.completed_count, 3);
        assert_eq!(outcome.state.percent_complete, 100.0);
        assert!(!outcome.state.failed);
        assert_eq!(compressor.calls(), 3);
        assert_eq!(compressor.max_in_flight.load(std::sync::atomic::Ordering::SeqCst), 1);

        let percents = sink.percents();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100.0));
    }

    #[tokio::test]
    async fn test_fail_fast_keeps_prefix() {
        let (optimizer, compressor, sink) = optimizer(FakeCompressor::failing_on(&["c.png"]));
        let set = working_set(&["a.png", "b.png", "c.png", "d.png", "e.png"]);

        let outcome = optimizer.optimize(&set, &CompressionConfig::default()).await;

        assert_eq!(outcome.artifacts.len(), 2);
        assert!(outcome.artifacts.iter().all(|a| a.source_index < 2));
        assert!(outcome.state.failed);
        assert_eq!(outcome.state.stopped_at_index, Some(2));
        assert_eq!(outcome.state.completed_count, 2);
        assert_eq!(outcome.state.percent_complete, 100.0);
        assert!(!outcome.is_complete());
        let failure = outcome.state.failure.as_ref().unwrap();
        assert_eq!(failure.name, "c.png");
        assert!(failure.cause.contains("corrupt test data"));
        let err = outcome.error().unwrap();
        assert!(matches!(err, OptimizeError::Compression { index: 2, .. }));

        // d and e were never handed to the compressor
        assert_eq!(compressor.calls(), 3);

        let events = sink.events();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::FileFailed { index: 2, name, .. } if name == "c.png"
        )));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::FileStarted { index, .. } if *index > 2)));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::RunFinished { failed: true, completed: 2, total: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_on_first_file() {
        let (optimizer, _, _) = optimizer(FakeCompressor::failing_on(&["a.png"]));
        let set = working_set(&["a.png", "b.png"]);

        let outcome = optimizer.optimize(&set, &CompressionConfig::default()).await;

        assert!(outcome.artifacts.is_empty());
        assert_eq!(outcome.state.stopped_at_index, Some(0));
        assert_eq!(outcome.state.percent_complete, 100.0);
    }

    #[tokio::test]
    async fn test_empty_working_set_is_noop() {
        let (optimizer, compressor, sink) = optimizer(FakeCompressor::default());

        let outcome = optimizer
            .optimize(&WorkingSet::empty(), &CompressionConfig::default())
            .await;

        assert!(outcome.artifacts.is_empty());
        assert_eq!(outcome.state.percent_complete, 100.0);
        assert!(outcome.state.finished);
        assert!(!outcome.state.failed);
        assert_eq!(compressor.calls(), 0);
        assert_eq!(sink.percents(), vec![100.0]);
    }

    #[tokio::test]
    async fn test_zero_byte_candidate_reaches_compressor() {
        let (optimizer, compressor, _) = optimizer(FakeCompressor::default());
        let set = WorkingSet::new(1, vec![RawFile::new("empty.png", Vec::<u8>::new())]);

        let outcome = optimizer.optimize(&set, &CompressionConfig::default()).await;

        assert_eq!(compressor.calls(), 1);
        assert_eq!(&outcome.artifacts[0].content[..], b"out:");
    }

    #[tokio::test]
    async fn test_sub_progress_is_aggregated() {
        let (optimizer, _, sink) = optimizer(FakeCompressor::default());
        let set = working_set(&["a", "b"]);

        optimizer.optimize(&set, &CompressionConfig::default()).await;

        // 50% of file 0, file 0 done, 50% of file 1, file 1 done
        assert_eq!(sink.percents(), vec![25.0, 50.0, 75.0, 100.0]);
    }
}
