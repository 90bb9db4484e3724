//! # Image Batch Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom per sessione e capability
//! - `utils`: Formattazione delle dimensioni in byte
//! - `file_manager`: Discovery dei file e working set
//! - `session`: Intake, run guard e pubblicazione dei risultati
//! - `optimizer`: Run sequenziale fail-fast e progresso aggregato
//! - `image_processor`: Capability di compressione (JPEG/PNG/WebP)
//! - `archive`: Capability di archiviazione (tar.gz)
//! - `publisher`: Handle di download per file e bundle
//! - `events`, `progress`, `json_output`: Eventi e loro presentazione
//!
//! ## Utilizzo:
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use image_batch_optimizer::{CompressionConfig, ImageProcessor, NullSink, RawFile, Session, TarGzArchiver};
//! use std::sync::Arc;
//!
//! let session = Session::new(
//!     Arc::new(ImageProcessor::new()),
//!     Arc::new(TarGzArchiver::new()),
//!     Arc::new(NullSink),
//! );
//! session.intake(vec![RawFile::new("photo.jpg", std::fs::read("photo.jpg")?)]).await?;
//! let _outcome = session.optimize(&CompressionConfig::default()).await?;
//! for handle in session.publication().await.files() {
//!     handle.save_to(std::path::Path::new("optimized")).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod events;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod optimizer;
pub mod progress;
pub mod publisher;
pub mod session;
pub mod utils;

pub use archive::{Archiver, TarGzArchiver};
pub use config::{CompressionConfig, Config, OutputFormat};
pub use error::{ArchiveError, CompressionError, OptimizeError};
pub use events::{EventSink, NullSink, SessionEvent};
pub use file_manager::{FileManager, RawFile};
pub use image_processor::{Compressor, ImageProcessor};
pub use optimizer::{Artifact, RunOutcome, RunState};
pub use publisher::{BundleHandle, DownloadHandle, Publication};
pub use session::Session;
pub use utils::format_bytes;
