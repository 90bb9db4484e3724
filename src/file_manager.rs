//! # File Management Module
//!
//! Questo modulo gestisce i file in ingresso: discovery su disco, lettura in
//! memoria e rappresentazione del batch di lavoro.
//!
//! ## Responsabilità:
//! - Discovery di immagini da file espliciti o directory (ricorsiva)
//! - Lettura dei file selezionati in `RawFile` (nome + contenuto)
//! - `Candidate` e `WorkingSet`: il batch ordinato e immutabile di una intake
//! - `PreviewDescriptor`: nome e dimensione di ogni file per la UI
//!
//! ## Formati riconosciuti nelle directory:
//! - **Immagini**: JPG, JPEG, PNG, WebP, GIF
//!
//! I file indicati esplicitamente vengono sempre accettati: è il compressore
//! a decidere se riesce a decodificarli, non la intake.
//!
//! ## Esempio:
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use image_batch_optimizer::file_manager::FileManager;
//! use std::path::PathBuf;
//!
//! let paths = FileManager::find_image_files(&[PathBuf::from("/path/to/photos")])?;
//! let files = FileManager::read_files(&paths).await?;
//! # Ok(())
//! # }
//! ```

use crate::utils::format_bytes;
use anyhow::Result;
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use walkdir::WalkDir;

/// A file as handed over by the caller, before intake
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub content: Bytes,
}

impl RawFile {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// One input file of the working set
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub byte_size: u64,
    pub content: Bytes,
}

impl From<RawFile> for Candidate {
    fn from(file: RawFile) -> Self {
        Self {
            byte_size: file.content.len() as u64,
            name: file.name,
            content: file.content,
        }
    }
}

/// Name and size of a candidate, reported to the UI right after intake
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewDescriptor {
    pub index: usize,
    pub name: String,
    pub byte_size: u64,
    pub size_label: String,
}

/// The ordered batch loaded by one intake.
///
/// Position is the identity of a candidate: names may repeat.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    generation: u64,
    candidates: Arc<[Candidate]>,
}

impl WorkingSet {
    pub fn new(generation: u64, files: Vec<RawFile>) -> Self {
        let candidates: Vec<Candidate> = files.into_iter().map(Candidate::from).collect();
        Self {
            generation,
            candidates: candidates.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    /// Identifier of the intake that produced this set
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn total_bytes(&self) -> u64 {
        self.candidates.iter().map(|c| c.byte_size).sum()
    }

    pub fn previews(&self) -> Vec<PreviewDescriptor> {
        self.candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| PreviewDescriptor {
                index,
                name: candidate.name.clone(),
                byte_size: candidate.byte_size,
                size_label: format_bytes(candidate.byte_size),
            })
            .collect()
    }
}

/// Manages file discovery and loading
pub struct FileManager;

impl FileManager {
    /// Expand the given inputs into a list of files.
    ///
    /// Files are kept as given; directories are walked recursively and only
    /// recognised image files are taken, in file-name order.
    pub fn find_image_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_file() {
                files.push(input.clone());
            } else if input.is_dir() {
                for entry in WalkDir::new(input)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    let path = entry.path();
                    if Self::is_image(path) {
                        files.push(path.to_path_buf());
                    }
                }
            } else {
                return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
            }
        }

        Ok(files)
    }

    /// Check if a file is a recognised image
    pub fn is_image(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            matches!(ext_lower.as_str(), "jpg" | "jpeg" | "png" | "webp" | "gif")
        } else {
            false
        }
    }

    /// Read files into memory, keeping the given order
    pub async fn read_files(paths: &[PathBuf]) -> Result<Vec<RawFile>> {
        let mut files = Vec::with_capacity(paths.len());

        for path in paths {
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
                .to_string_lossy()
                .to_string();
            let content = fs::read(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
            files.push(RawFile::new(name, content));
        }

        Ok(files)
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
