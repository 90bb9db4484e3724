//! # Bundle Archive Module
//!
//! Capability di archiviazione: impacchetta tutti i file prodotti da un run
//! in un unico blob scaricabile.
//!
//! `TarGzArchiver` scrive un tar compresso con gzip, costruito in memoria su
//! un thread bloccante. Le entry seguono l'ordine degli artifact; nomi
//! duplicati vengono scritti così come sono (in estrazione vince l'ultimo).

use crate::error::ArchiveError;
use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// File name given to the bundle download
pub const BUNDLE_FILE_NAME: &str = "optimized-images.tar.gz";

/// One file stored in a bundle
#[derive(Debug, Clone, PartialEq)]
pub struct BundleEntry {
    pub name: String,
    pub content: Bytes,
}

/// Archive capability: many named blobs in, one archive blob out
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Name under which the archive is offered for download
    fn file_name(&self) -> &str;

    async fn build_archive(&self, entries: Vec<BundleEntry>) -> Result<Bytes, ArchiveError>;
}

/// Builds `.tar.gz` bundles
#[derive(Debug, Clone)]
pub struct TarGzArchiver {
    level: Compression,
}

impl TarGzArchiver {
    pub fn new() -> Self {
        Self {
            // images are already compressed, a fast level is enough
            level: Compression::fast(),
        }
    }

    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    fn write_archive(entries: &[BundleEntry], level: Compression) -> Result<Vec<u8>, ArchiveError> {
        let mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let encoder = GzEncoder::new(Vec::new(), level);
        let mut tar = tar::Builder::new(encoder);

        for entry in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(entry.content.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            tar.append_data(&mut header, &entry.name, &entry.content[..])?;
        }

        let encoder = tar.into_inner()?;
        Ok(encoder.finish()?)
    }
}

impl Default for TarGzArchiver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Archiver for TarGzArchiver {
    fn file_name(&self) -> &str {
        BUNDLE_FILE_NAME
    }

    async fn build_archive(&self, entries: Vec<BundleEntry>) -> Result<Bytes, ArchiveError> {
        let level = self.level;
        let count = entries.len();
        let archive = tokio::task::spawn_blocking(move || Self::write_archive(&entries, level))
            .await
            .map_err(|e| ArchiveError::Aborted(e.to_string()))??;

        debug!("Built bundle with {} entries ({} bytes)", count, archive.len());
        Ok(Bytes::from(archive))
    }
}
