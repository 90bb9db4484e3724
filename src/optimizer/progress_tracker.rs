//! # Progress Tracking Module
//!
//! Stato transitorio di un run (`RunState`) e calcolo della percentuale
//! aggregata. Ogni avanzamento viene inoltrato al sink come `SessionEvent`.
//!
//! ## Percentuale aggregata:
//! - durante il file `i` di `N`: `(i * 100 + sub) / N`
//! - a file completato: `completed * 100 / N`
//! - a fine run (completo o interrotto): 100
//!
//! La percentuale non scende mai all'interno di un run.

use crate::events::{EventSink, SessionEvent};
use serde::Serialize;
use std::sync::Arc;

/// Why a run stopped early
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFailure {
    pub index: usize,
    pub name: String,
    pub cause: String,
}

/// Progress and outcome of one optimization run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub total_count: usize,
    pub completed_count: usize,
    pub percent_complete: f64,
    pub current_file_name: Option<String>,
    pub failed: bool,
    pub stopped_at_index: Option<usize>,
    pub failure: Option<RunFailure>,
    pub finished: bool,
}

impl RunState {
    pub fn new(total_count: usize) -> Self {
        Self {
            total_count,
            completed_count: 0,
            percent_complete: 0.0,
            current_file_name: None,
            failed: false,
            stopped_at_index: None,
            failure: None,
            finished: false,
        }
    }

    /// Aggregate percentage while file `index` reports `sub_progress`
    pub fn aggregate_percent(index: usize, sub_progress: f64, total: usize) -> f64 {
        if total == 0 {
            return 100.0;
        }
        let sub = if sub_progress.is_finite() {
            sub_progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        ((index as f64) * 100.0 + sub) / total as f64
    }

    /// Raise the percentage; returns false when it would not increase
    fn advance_to(&mut self, percent: f64) -> bool {
        let percent = percent.min(100.0);
        if percent > self.percent_complete {
            self.percent_complete = percent;
            true
        } else {
            false
        }
    }

    pub fn begin_file(&mut self, name: &str) {
        self.current_file_name = Some(name.to_string());
    }

    pub fn report_sub_progress(&mut self, index: usize, sub_progress: f64) -> bool {
        let percent = Self::aggregate_percent(index, sub_progress, self.total_count);
        self.advance_to(percent)
    }

    pub fn complete_file(&mut self) -> bool {
        self.completed_count += 1;
        let percent = if self.total_count == 0 {
            100.0
        } else {
            (self.completed_count as f64) * 100.0 / self.total_count as f64
        };
        self.advance_to(percent)
    }

    pub fn fail(&mut self, index: usize, name: &str, cause: String) {
        self.failed = true;
        self.stopped_at_index = Some(index);
        self.failure = Some(RunFailure {
            index,
            name: name.to_string(),
            cause,
        });
    }

    /// Mark the run as over. Percent is forced to 100 even after a failure.
    pub fn finish(&mut self) {
        self.percent_complete = 100.0;
        self.finished = true;
    }
}

/// Tracker che aggiorna `RunState` e notifica il sink
pub struct ProgressTracker {
    state: RunState,
    sink: Arc<dyn EventSink>,
}

impl ProgressTracker {
    pub fn new(total: usize, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: RunState::new(total),
            sink,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn into_state(self) -> RunState {
        self.state
    }

    pub fn emit(&self, event: SessionEvent) {
        self.sink.on_event(&event);
    }

    fn emit_progress(&self) {
        self.emit(SessionEvent::Progress {
            percent: self.state.percent_complete,
            current_file: self.state.current_file_name.clone(),
        });
    }

    pub fn begin_file(&mut self, index: usize, name: &str) {
        self.state.begin_file(name);
        self.emit(SessionEvent::FileStarted {
            index,
            name: name.to_string(),
            message: format!("Optimizing \"{}\"...", name),
        });
    }

    /// Progress callback target for the compressor (0-100 for the current file)
    pub fn report_sub_progress(&mut self, index: usize, sub_progress: f64) {
        if self.state.report_sub_progress(index, sub_progress) {
            self.emit_progress();
        }
    }

    pub fn complete_file(&mut self) {
        if self.state.complete_file() {
            self.emit_progress();
        }
    }

    pub fn fail(&mut self, index: usize, name: &str, cause: String) {
        self.state.fail(index, name, cause.clone());
        self.emit(SessionEvent::FileFailed {
            index,
            name: name.to_string(),
            cause,
            message: format!("Error optimizing \"{}\".", name),
        });
    }

    pub fn finish(&mut self) {
        let advanced = self.state.percent_complete < 100.0;
        self.state.finish();
        if advanced {
            self.emit_progress();
        }
        self.emit(SessionEvent::RunFinished {
            completed: self.state.completed_count,
            total: self.state.total_count,
            failed: self.state.failed,
            stopped_at_index: self.state.stopped_at_index,
            message: "Optimization complete!".to_string(),
        });
    }
}
