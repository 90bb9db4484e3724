//! # Path Resolution Module
//!
//! Centralizza il calcolo dei nomi dei file prodotti e dei path di output.

use crate::config::OutputFormat;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Utility per calcolare nomi e path di output in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Replace the extension of `name` with the canonical one of `format`.
    ///
    /// `photo.PNG` becomes `photo.webp`; a name without a dot (or whose only
    /// dot is the leading one, like `.hidden`) keeps its full text and gets
    /// the extension appended.
    pub fn derived_name(name: &str, format: OutputFormat) -> String {
        let stem = match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        };
        format!("{}.{}", stem, format.extension())
    }

    /// Path of a produced file inside the output directory.
    ///
    /// Only the final component of `file_name` is used, so names can never
    /// escape the output directory.
    pub fn get_output_path(output_dir: &Path, file_name: &str) -> Result<PathBuf> {
        let leaf = Path::new(file_name)
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", file_name))?;
        let result = output_dir.join(leaf);
        debug!("Resolved output path: {} -> {}", file_name, result.display());
        Ok(result)
    }

    /// Crea le directory parent se necessario
    pub async fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow::anyhow!("Failed to create parent directories for {}: {}", path.display(), e)
            })?;
        }
        Ok(())
    }
}
