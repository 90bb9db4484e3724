//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri utente (CLI + file JSON)
//! - Deriva la `CompressionConfig` immutabile applicata a ogni file di un run
//! - Fornisce validazione dei parametri e valori di default sensati
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//!
//! ## Parametri di configurazione:
//! - `max_output_bytes`: Dimensione massima di ogni file prodotto (default: 1 MB)
//! - `max_longest_edge`: Lato lungo massimo in pixel (default: 1920)
//! - `output_format`: Formato di output (default: WebP)
//! - `initial_quality` / `min_quality`: Range di qualità per i formati lossy (default: 90 / 30)
//! - `max_iterations`: Tentativi di encoding per rientrare nel budget (default: 10)
//! - `output_path`: Directory dove scrivere i file ottimizzati (default: `optimized`)
//! - `bundle`: Scrive anche l'archivio con tutti i file (default: true)
//! - `json_output`: Eventi JSON su stdout invece della progress bar (default: false)
//!
//! ## Esempio:
//! ```rust
//! use image_batch_optimizer::{Config, config::OutputFormat};
//!
//! let config = Config {
//!     max_longest_edge: 1280,
//!     output_format: OutputFormat::Jpeg,
//!     ..Default::default()
//! };
//! config.validate().unwrap();
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One megabyte, as the size budget is expressed in the UI
pub const MEGABYTE: u64 = 1024 * 1024;

/// Largest edge libwebp can encode, in pixels
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// Output encodings the compressor can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Webp,
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Canonical file extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    /// Whether the quality setting has any effect on the encoder
    pub fn is_lossy(&self) -> bool {
        !matches!(self, OutputFormat::Png)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// User-facing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum size of each produced file, in bytes
    pub max_output_bytes: u64,
    /// Maximum length of the longest image edge, in pixels
    pub max_longest_edge: u32,
    /// Encoding of the produced files
    pub output_format: OutputFormat,
    /// First quality tried by lossy encoders (1-100)
    pub initial_quality: u8,
    /// Lowest quality lossy encoders may fall back to (1-100)
    pub min_quality: u8,
    /// Maximum encode attempts per file while searching for the size budget
    pub max_iterations: u32,
    /// Directory receiving the optimized files and the bundle
    pub output_path: PathBuf,
    /// Also write the bundle archive when more than one file was produced
    pub bundle: bool,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_output_bytes: MEGABYTE,
            max_longest_edge: 1920,
            output_format: OutputFormat::Webp,
            initial_quality: 90,
            min_quality: 30,
            max_iterations: 10,
            output_path: PathBuf::from("optimized"),
            bundle: true,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_output_bytes == 0 {
            return Err(anyhow::anyhow!("Maximum output size must be greater than 0"));
        }

        if self.max_longest_edge == 0 {
            return Err(anyhow::anyhow!("Maximum dimension must be greater than 0"));
        }

        if self.output_format == OutputFormat::Webp && self.max_longest_edge > WEBP_MAX_DIMENSION {
            return Err(anyhow::anyhow!(
                "Maximum dimension for WebP output is {} px",
                WEBP_MAX_DIMENSION
            ));
        }

        if self.initial_quality == 0 || self.initial_quality > 100 {
            return Err(anyhow::anyhow!("Initial quality must be between 1 and 100"));
        }

        if self.min_quality == 0 || self.min_quality > 100 {
            return Err(anyhow::anyhow!("Minimum quality must be between 1 and 100"));
        }

        if self.min_quality > self.initial_quality {
            return Err(anyhow::anyhow!(
                "Minimum quality ({}) cannot exceed initial quality ({})",
                self.min_quality,
                self.initial_quality
            ));
        }

        if self.max_iterations == 0 {
            return Err(anyhow::anyhow!("Number of encode iterations must be greater than 0"));
        }

        if self.output_path.exists() && !self.output_path.is_dir() {
            return Err(anyhow::anyhow!(
                "Output path is not a directory: {}",
                self.output_path.display()
            ));
        }

        Ok(())
    }

    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("image-optimizer").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Compression settings applied uniformly to every file of one run
    pub fn compression(&self) -> CompressionConfig {
        CompressionConfig::from(self)
    }
}

/// Immutable settings handed to the compressor for every candidate of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub max_output_bytes: u64,
    pub max_longest_edge: u32,
    pub output_format: OutputFormat,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub max_iterations: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CompressionConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_output_bytes: config.max_output_bytes,
            max_longest_edge: config.max_longest_edge,
            output_format: config.output_format,
            initial_quality: config.initial_quality,
            min_quality: config.min_quality,
            max_iterations: config.max_iterations,
        }
    }
}
