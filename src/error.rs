//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Categorie di errori:
//! - `CompressionError`: il codec ha rifiutato un singolo file (corrotto, formato non supportato)
//! - `ArchiveError`: la costruzione del bundle è fallita
//! - `OptimizeError`: errori della sessione (run già attivo, file fallito, bundle fallito, handle scaduti)
//!
//! ## Propagazione:
//! - Un `CompressionError` interrompe il run corrente (fail-fast) ma non la sessione
//! - Un `ArchiveError` non invalida gli handle per-file già pubblicati
//! - Nessun retry automatico: l'utente riseleziona i file e rilancia
//!
//! ## Esempio:
//! ```rust
//! use image_batch_optimizer::OptimizeError;
//!
//! let err = OptimizeError::Compression {
//!     index: 2,
//!     name: "broken.png".to_string(),
//!     message: "Failed to decode image: invalid signature".to_string(),
//! };
//! assert!(err.to_string().contains("broken.png"));
//! ```

/// Failure reported by a compression capability for one file
#[derive(thiserror::Error, Debug)]
pub enum CompressionError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode {format}: {reason}")]
    Encode { format: &'static str, reason: String },

    #[error("Image has no pixels")]
    EmptyImage,

    #[error("Compression task aborted: {0}")]
    Aborted(String),
}

/// Failure reported by an archive capability
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("Archive write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive task aborted: {0}")]
    Aborted(String),
}

/// Custom error types for the optimization session
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("An optimization run is already in progress")]
    RunInProgress,

    #[error("Error optimizing \"{name}\" (file #{index}): {message}")]
    Compression {
        index: usize,
        name: String,
        message: String,
    },

    #[error("Bundle construction failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Download handle is no longer valid: a newer result set was published")]
    StaleHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_message_names_file() {
        let err = OptimizeError::Compression {
            index: 1,
            name: "cat.gif".to_string(),
            message: CompressionError::EmptyImage.to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("\"cat.gif\""));
        assert!(text.contains("#1"));
        assert!(text.contains("no pixels"));
    }

    #[test]
    fn test_archive_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: OptimizeError = ArchiveError::from(io).into();
        assert!(matches!(err, OptimizeError::Archive(ArchiveError::Io(_))));
        assert!(err.to_string().contains("disk full"));
    }
}
