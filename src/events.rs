//! # Session Events
//!
//! Everything the presentation layer learns about a session arrives as a
//! [`SessionEvent`] delivered to an [`EventSink`]. Sinks are observers: they
//! never feed back into the pipeline.

use crate::file_manager::PreviewDescriptor;
use serde::Serialize;

/// Events emitted by intake, the batch optimizer and the publisher
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new working set replaced the previous one
    BatchLoaded {
        generation: u64,
        files: Vec<PreviewDescriptor>,
        optimize_enabled: bool,
    },

    /// Preview decoding succeeded for one candidate
    PreviewReady {
        generation: u64,
        index: usize,
        width: u32,
        height: u32,
        format: String,
    },

    /// Preview decoding failed; the candidate stays in the working set
    PreviewUnavailable {
        generation: u64,
        index: usize,
        reason: String,
    },

    RunStarted {
        generation: u64,
        total: usize,
    },

    FileStarted {
        index: usize,
        name: String,
        message: String,
    },

    /// Aggregate progress of the whole run, 0-100 and never decreasing
    Progress {
        percent: f64,
        current_file: Option<String>,
    },

    FileCompleted {
        index: usize,
        name: String,
        derived_name: String,
        original_size: u64,
        optimized_size: u64,
        optimized_size_label: String,
        message: String,
    },

    FileFailed {
        index: usize,
        name: String,
        cause: String,
        message: String,
    },

    /// The run ended, either after the last file or at the first failure
    RunFinished {
        completed: usize,
        total: usize,
        failed: bool,
        stopped_at_index: Option<usize>,
        message: String,
    },

    /// Download handles are available for the listed files
    Published {
        files: Vec<PublishedFile>,
        bundle_available: bool,
    },

    BundleFailed {
        reason: String,
    },
}

/// A file listed in a [`SessionEvent::Published`] event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedFile {
    pub name: String,
    pub byte_size: u64,
}

/// Observer notified of every session event
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&self, _event: &SessionEvent) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records events for assertions
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<SessionEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn percents(&self) -> Vec<f64> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    SessionEvent::Progress { percent, .. } => Some(percent),
                    _ => None,
                })
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn on_event(&self, event: &SessionEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
