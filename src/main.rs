//! # Image Batch Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (file + override da CLI)
//! - Avvio della sessione e scrittura dei file prodotti
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, dimensione massima, formato, etc.)
//! 2. Configura il logging su stderr (INFO o DEBUG a seconda del flag verbose)
//! 3. Carica e valida la configurazione
//! 4. Legge i file selezionati e li passa alla sessione (intake)
//! 5. Esegue il run e salva ogni file prodotto, più il bundle se richiesto
//!
//! ## Esempio di utilizzo:
//! ```bash
//! image-optimizer ~/Pictures/trip --max-size-mb 0.5 --max-dimension 1600 --output ./web
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use image_batch_optimizer::{
    config::MEGABYTE,
    json_output::JsonSink,
    progress::{ConsoleSink, ProgressManager},
    Config, EventSink, FileManager, ImageProcessor, OutputFormat, Session, TarGzArchiver,
};

#[derive(Parser)]
#[command(name = "image-optimizer")]
#[command(about = "Compress a batch of images under a size and dimension budget")]
struct Args {
    /// Image files or directories to optimize
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory for optimized files [default: ./optimized]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum size of each optimized file, in megabytes [default: 1]
    #[arg(long)]
    max_size_mb: Option<f64>,

    /// Maximum length of the longest edge, in pixels [default: 1920]
    #[arg(long)]
    max_dimension: Option<u32>,

    /// Output format [default: webp]
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Initial encoder quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Lowest quality the encoder may fall back to (1-100)
    #[arg(long)]
    min_quality: Option<u8>,

    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the resulting configuration for later runs
    #[arg(long)]
    save_config: bool,

    /// Do not write the bundle archive
    #[arg(long)]
    no_bundle: bool,

    /// Output progress and status as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply_to(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(mb) = self.max_size_mb {
            config.max_output_bytes = (mb * MEGABYTE as f64).round() as u64;
        }
        if let Some(dimension) = self.max_dimension {
            config.max_longest_edge = dimension;
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(quality) = self.quality {
            config.initial_quality = quality;
        }
        if let Some(min_quality) = self.min_quality {
            config.min_quality = min_quality;
        }
        if self.no_bundle {
            config.bundle = false;
        }
        if self.json {
            config.json_output = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, so that JSON output on stdout stays clean)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = args.config.clone().or_else(Config::default_path);
    let mut config = match &config_path {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;

    if args.save_config {
        let path = config_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No configuration directory available"))?;
        config.save_to_file(path).await?;
        info!("Configuration saved to {}", path.display());
    }

    let paths = FileManager::find_image_files(&args.inputs)?;
    if paths.is_empty() {
        warn!("No image files found in the given inputs");
        return Ok(());
    }
    let files = FileManager::read_files(&paths).await?;

    let sink: Arc<dyn EventSink> = if config.json_output {
        Arc::new(JsonSink::new())
    } else {
        Arc::new(ConsoleSink::new())
    };
    let session = Session::new(
        Arc::new(ImageProcessor::new()),
        Arc::new(TarGzArchiver::new()),
        sink,
    );

    session.intake(files).await?;
    session.settle_previews().await;

    let outcome = session.optimize(&config.compression()).await?;
    let publication = session.publication().await;

    if !publication.is_empty() {
        tokio::fs::create_dir_all(&config.output_path).await?;
        info!("Created output directory: {}", config.output_path.display());
    }

    for handle in publication.files() {
        let path = handle.save_to(&config.output_path).await?;
        debug!("Wrote {}", path.display());
    }

    let mut bundle_error = None;
    if let Some(bundle) = publication.bundle().filter(|_| config.bundle) {
        let spinner = (!config.json_output)
            .then(|| ProgressManager::spinner(&format!("Building {}...", bundle.file_name())));
        let saved = bundle.save_to(&config.output_path).await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        match saved {
            Ok(path) => info!("Bundle written to {}", path.display()),
            Err(e) => {
                error!("Could not write bundle: {}", e);
                bundle_error = Some(e);
            }
        }
    }

    if let Some(err) = outcome.error() {
        return Err(err.into());
    }
    if let Some(err) = bundle_error {
        return Err(err);
    }

    info!(
        "Optimized {} files into {}",
        outcome.artifacts.len(),
        config.output_path.display()
    );
    Ok(())
}
