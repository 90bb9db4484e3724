//! # Optimizer Module
//!
//! Modulo che separa le responsabilità del run in sottomoduli:
//! - `batch`: Orchestratore sequenziale del run (fail-fast)
//! - `progress_tracker`: `RunState` e percentuale aggregata
//! - `path_resolver`: Nomi dei file prodotti e path di output

pub mod batch;
pub mod path_resolver;
pub mod progress_tracker;

pub use batch::{Artifact, BatchOptimizer, RunOutcome};
pub use path_resolver::PathResolver;
pub use progress_tracker::{ProgressTracker, RunFailure, RunState};
