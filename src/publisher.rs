//! # Result Publisher
//!
//! Trasforma la lista di artifact di un run in handle scaricabili.
//!
//! ## Regole:
//! - un `DownloadHandle` per artifact, nello stesso ordine
//! - un `BundleHandle` solo se gli artifact sono più di uno
//! - il bundle viene costruito in modo lazy, al primo `build()`, e poi riusato
//! - al massimo una costruzione di archivio in corso alla volta
//! - ogni nuova pubblicazione invalida gli handle precedenti (`StaleHandle`)

use crate::{
    archive::{Archiver, BundleEntry},
    error::OptimizeError,
    events::{EventSink, PublishedFile, SessionEvent},
    optimizer::{batch::Artifact, path_resolver::PathResolver},
};
use anyhow::Result;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info};

/// Generation shared by a publisher and every handle it created
#[derive(Debug, Clone, Default)]
struct Liveness {
    current: Arc<AtomicU64>,
}

impl Liveness {
    fn bump(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_live(&self, generation: u64) -> bool {
        self.current.load(Ordering::SeqCst) == generation
    }
}

/// Download handle for one produced file
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    artifact: Artifact,
    generation: u64,
    liveness: Liveness,
}

impl DownloadHandle {
    pub fn file_name(&self) -> &str {
        &self.artifact.derived_name
    }

    pub fn byte_size(&self) -> u64 {
        self.artifact.byte_size
    }

    pub fn source_index(&self) -> usize {
        self.artifact.source_index
    }

    pub fn is_valid(&self) -> bool {
        self.liveness.is_live(self.generation)
    }

    pub fn content(&self) -> Result<Bytes, OptimizeError> {
        if !self.is_valid() {
            return Err(OptimizeError::StaleHandle);
        }
        Ok(self.artifact.content.clone())
    }

    /// Write the file into `dir`, returning its path
    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        let content = self.content()?;
        let path = PathResolver::get_output_path(dir, self.file_name())?;
        PathResolver::ensure_parent_dirs(&path).await?;
        tokio::fs::write(&path, &content).await?;
        debug!("Saved {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }
}

/// Download handle for the archive of every produced file
#[derive(Clone)]
pub struct BundleHandle {
    artifacts: Arc<[Artifact]>,
    archiver: Arc<dyn Archiver>,
    sink: Arc<dyn EventSink>,
    build_lock: Arc<Mutex<()>>,
    built: Arc<OnceCell<Bytes>>,
    generation: u64,
    liveness: Liveness,
}

impl std::fmt::Debug for BundleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleHandle")
            .field("file_name", &self.file_name())
            .field("entries", &self.artifacts.len())
            .field("generation", &self.generation)
            .finish()
    }
}

impl BundleHandle {
    pub fn file_name(&self) -> &str {
        self.archiver.file_name()
    }

    pub fn entry_count(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_valid(&self) -> bool {
        self.liveness.is_live(self.generation)
    }

    /// Build (or reuse) the archive bytes.
    ///
    /// A failed build is reported to the sink and can be attempted again by
    /// calling `build` once more; per-file handles are not affected.
    pub async fn build(&self) -> Result<Bytes, OptimizeError> {
        if !self.is_valid() {
            return Err(OptimizeError::StaleHandle);
        }

        let result = self
            .built
            .get_or_try_init(|| async {
                let _guard = self.build_lock.lock().await;
                let entries = self
                    .artifacts
                    .iter()
                    .map(|artifact| BundleEntry {
                        name: artifact.derived_name.clone(),
                        content: artifact.content.clone(),
                    })
                    .collect();
                info!("Building bundle {} with {} files", self.file_name(), self.artifacts.len());
                self.archiver.build_archive(entries).await
            })
            .await;

        match result {
            Ok(bytes) => Ok(bytes.clone()),
            Err(e) => {
                error!("Bundle construction failed: {}", e);
                self.sink.on_event(&SessionEvent::BundleFailed {
                    reason: e.to_string(),
                });
                Err(OptimizeError::Archive(e))
            }
        }
    }

    /// Build the archive and write it into `dir`
    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        let content = self.build().await?;
        let path = PathResolver::get_output_path(dir, self.file_name())?;
        PathResolver::ensure_parent_dirs(&path).await?;
        tokio::fs::write(&path, &content).await?;
        debug!("Saved bundle {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }
}

/// Handles exposed for one published artifact list
#[derive(Debug, Clone)]
pub struct Publication {
    generation: u64,
    files: Vec<DownloadHandle>,
    bundle: Option<BundleHandle>,
    liveness: Liveness,
}

impl Publication {
    pub fn files(&self) -> &[DownloadHandle] {
        &self.files
    }

    pub fn bundle(&self) -> Option<&BundleHandle> {
        self.bundle.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_current(&self) -> bool {
        self.liveness.is_live(self.generation)
    }
}

/// Creates publications and invalidates the previous ones
pub struct ResultPublisher {
    archiver: Arc<dyn Archiver>,
    sink: Arc<dyn EventSink>,
    build_lock: Arc<Mutex<()>>,
    liveness: Liveness,
}

impl ResultPublisher {
    pub fn new(archiver: Arc<dyn Archiver>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            archiver,
            sink,
            build_lock: Arc::new(Mutex::new(())),
            liveness: Liveness::default(),
        }
    }

    /// Empty publication at the current generation, without notifying the sink
    pub fn unpublished(&self) -> Publication {
        Publication {
            generation: self.liveness.current.load(Ordering::SeqCst),
            files: Vec::new(),
            bundle: None,
            liveness: self.liveness.clone(),
        }
    }

    pub fn publish(&self, artifacts: Arc<[Artifact]>) -> Publication {
        let generation = self.liveness.bump();

        let files: Vec<DownloadHandle> = artifacts
            .iter()
            .map(|artifact| DownloadHandle {
                artifact: artifact.clone(),
                generation,
                liveness: self.liveness.clone(),
            })
            .collect();

        let bundle = (artifacts.len() > 1).then(|| BundleHandle {
            artifacts: Arc::clone(&artifacts),
            archiver: Arc::clone(&self.archiver),
            sink: Arc::clone(&self.sink),
            build_lock: Arc::clone(&self.build_lock),
            built: Arc::new(OnceCell::new()),
            generation,
            liveness: self.liveness.clone(),
        });

        self.sink.on_event(&SessionEvent::Published {
            files: files
                .iter()
                .map(|handle| PublishedFile {
                    name: handle.file_name().to_string(),
                    byte_size: handle.byte_size(),
                })
                .collect(),
            bundle_available: bundle.is_some(),
        });

        Publication {
            generation,
            files,
            bundle,
            liveness: self.liveness.clone(),
        }
    }

    /// Drop every handle handed out so far
    pub fn clear(&self) -> Publication {
        self.publish(Arc::from(Vec::new()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::ArchiveError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex as StdMutex;

    /// Archiver recording what it was asked to bundle
    #[derive(Default)]
    pub struct FakeArchiver {
        pub calls: AtomicUsize,
        pub fail: AtomicBool,
        pub received: StdMutex<Vec<Vec<(String, Bytes)>>>,
    }

    impl FakeArchiver {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Archiver for FakeArchiver {
        fn file_name(&self) -> &str {
            "bundle.fake"
        }

        async fn build_archive(&self, entries: Vec<BundleEntry>) -> Result<Bytes, ArchiveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(ArchiveError::Aborted("archiver offline".to_string()));
            }
            let pairs: Vec<(String, Bytes)> =
                entries.into_iter().map(|e| (e.name, e.content)).collect();
            let joined = pairs
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(",");
            self.received.lock().unwrap().push(pairs);
            Ok(Bytes::from(joined))
        }
    }
}
