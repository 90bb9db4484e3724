//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il feedback su terminale e le statistiche del run.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Tracking statistiche di ottimizzazione (file ottimizzati, errori, byte risparmiati)
//! - Report finale con statistiche aggregate
//!
//! ## Componenti principali:
//! - `ProgressManager`: Gestisce la progress bar (posizione = percentuale aggregata)
//! - `OptimizationStats`: Traccia statistiche cumulative
//! - `ConsoleSink`: `EventSink` che collega gli eventi della sessione a barra e log
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:04] [========================>---------------] 62/100 (62%) Optimizing "photo.jpg"...
//! ```

use crate::events::{EventSink, SessionEvent};
use crate::file_manager::FileManager;
use crate::utils::format_bytes;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, warn};

/// Manages the terminal progress bar of one run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager measuring percent (0-100)
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Move the bar to an aggregate percentage
    pub fn set_percent(&self, percent: f64) {
        self.bar.set_position(percent.clamp(0.0, 100.0).round() as u64);
    }

    /// Set a custom message without moving the bar
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.set_position(100);
        self.bar.finish_with_message(message.to_string());
    }

    /// Print a line above the bar
    pub fn println(&self, message: &str) {
        self.bar.println(message);
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics tracker for optimization results
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OptimizationStats {
    pub files_total: usize,
    pub files_optimized: usize,
    pub errors: usize,
    pub total_original_size: u64,
    pub total_optimized_size: u64,
}

impl OptimizationStats {
    pub fn new(files_total: usize) -> Self {
        Self {
            files_total,
            ..Default::default()
        }
    }

    pub fn add_optimized(&mut self, original_size: u64, new_size: u64) {
        self.files_optimized += 1;
        self.total_original_size += original_size;
        self.total_optimized_size += new_size;
    }

    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    /// Bytes saved; files that grew count as zero savings
    pub fn total_bytes_saved(&self) -> u64 {
        self.total_original_size.saturating_sub(self.total_optimized_size)
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved() as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Files neither optimized nor failed (after a fail-fast stop)
    pub fn files_not_processed(&self) -> usize {
        self.files_total
            .saturating_sub(self.files_optimized + self.errors)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Optimized: {}/{} | Errors: {} | Not processed: {} | Total saved: {} ({:.2}%)",
            self.files_optimized,
            self.files_total,
            self.errors,
            self.files_not_processed(),
            format_bytes(self.total_bytes_saved()),
            self.overall_reduction_percent()
        )
    }
}

/// Terminal sink: progress bar for runs, log lines for everything else
#[derive(Default)]
pub struct ConsoleSink {
    bar: Mutex<Option<ProgressManager>>,
    stats: Mutex<OptimizationStats>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics of the most recent run
    pub fn stats(&self) -> OptimizationStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressManager)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }

    fn with_stats(&self, f: impl FnOnce(&mut OptimizationStats)) {
        if let Ok(mut guard) = self.stats.lock() {
            f(&mut guard);
        }
    }
}

impl EventSink for ConsoleSink {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::BatchLoaded { files, optimize_enabled, .. } => {
                if *optimize_enabled {
                    info!("Loaded {} files", files.len());
                    for file in files {
                        info!("  • {} ({})", file.name, file.size_label);
                    }
                } else {
                    info!("No files selected, optimization disabled");
                }
            }
            SessionEvent::PreviewReady { index, width, height, format, .. } => {
                tracing::debug!("Preview #{}: {}x{} {}", index, width, height, format);
            }
            SessionEvent::PreviewUnavailable { index, reason, .. } => {
                warn!("No preview for file #{}: {}", index, reason);
            }
            SessionEvent::RunStarted { total, .. } => {
                self.with_stats(|stats| *stats = OptimizationStats::new(*total));
                if let Ok(mut guard) = self.bar.lock() {
                    *guard = Some(ProgressManager::new());
                }
            }
            SessionEvent::FileStarted { message, .. } => {
                self.with_bar(|bar| bar.set_message(message));
            }
            SessionEvent::Progress { percent, .. } => {
                self.with_bar(|bar| bar.set_percent(*percent));
            }
            SessionEvent::FileCompleted {
                name,
                original_size,
                optimized_size,
                optimized_size_label,
                message,
                ..
            } => {
                self.with_stats(|stats| stats.add_optimized(*original_size, *optimized_size));
                self.with_bar(|bar| {
                    bar.set_message(message);
                    bar.println(&format!(
                        "[OK] {}: {} -> {} ({:.1}% smaller)",
                        name,
                        format_bytes(*original_size),
                        optimized_size_label,
                        FileManager::calculate_reduction(*original_size, *optimized_size)
                    ));
                });
            }
            SessionEvent::FileFailed { message, cause, .. } => {
                self.with_stats(|stats| stats.add_error());
                self.with_bar(|bar| bar.set_message(message));
                error!("{} {}", message, cause);
            }
            SessionEvent::RunFinished { message, .. } => {
                let summary = format!("{} {}", message, self.stats().format_summary());
                if let Ok(mut guard) = self.bar.lock() {
                    if let Some(bar) = guard.take() {
                        bar.finish(&summary);
                    }
                }
                info!("{}", summary);
            }
            SessionEvent::Published { files, .. } if files.is_empty() => {}
            SessionEvent::Published { files, bundle_available } => {
                info!(
                    "{} files ready for download{}",
                    files.len(),
                    if *bundle_available { " (bundle available)" } else { "" }
                );
            }
            SessionEvent::BundleFailed { reason } => {
                error!("Bundle download failed: {}", reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_summary() {
        let mut stats = OptimizationStats::new(3);
        stats.add_optimized(2048, 1024);
        stats.add_error();

        assert_eq!(stats.total_bytes_saved(), 1024);
        assert_eq!(stats.overall_reduction_percent(), 50.0);
        assert_eq!(stats.files_not_processed(), 1);
        let summary = stats.format_summary();
        assert!(summary.contains("Optimized: 1/3"));
        assert!(summary.contains("Errors: 1"));
        assert!(summary.contains("1 KB"));
    }

    #[test]
    fn test_growth_counts_as_no_savings() {
        let mut stats = OptimizationStats::new(1);
        stats.add_optimized(100, 150);
        assert_eq!(stats.total_bytes_saved(), 0);
        assert_eq!(stats.overall_reduction_percent(), 0.0);
    }

    #[test]
    fn test_console_sink_tracks_run() {
        let sink = ConsoleSink::new();
        sink.on_event(&SessionEvent::RunStarted { generation: 1, total: 2 });
        sink.on_event(&SessionEvent::FileCompleted {
            index: 0,
            name: "a.png".to_string(),
            derived_name: "a.webp".to_string(),
            original_size: 4000,
            optimized_size: 1000,
            optimized_size_label: format_bytes(1000),
            message: "Optimization complete for \"a.png\".".to_string(),
        });
        sink.on_event(&SessionEvent::FileFailed {
            index: 1,
            name: "b.png".to_string(),
            cause: "bad data".to_string(),
            message: "Error optimizing \"b.png\".".to_string(),
        });
        sink.on_event(&SessionEvent::RunFinished {
            completed: 1,
            total: 2,
            failed: true,
            stopped_at_index: Some(1),
            message: "Optimization complete!".to_string(),
        });

        let stats = sink.stats();
        assert_eq!(stats.files_optimized, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.total_bytes_saved(), 3000);
    }
}
