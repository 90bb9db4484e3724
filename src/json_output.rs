//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per comunicazione con
//! altri processi (UI esterne, script).
//!
//! ## Responsabilità:
//! - Emette un oggetto JSON per riga su stdout per ogni `SessionEvent`
//! - Il campo `type` identifica il messaggio (`batch_loaded`, `progress`, `file_completed`, ...)
//! - I log `tracing` restano su stderr, quindi stdout contiene solo JSON
//!
//! ## Esempio di output:
//! ```text
//! {"type":"run_started","generation":1,"total":2}
//! {"type":"progress","percent":25.0,"current_file":"a.png"}
//! ```

use crate::events::{EventSink, SessionEvent};
use std::io::Write;
use tracing::warn;

/// Sink che scrive ogni evento come riga JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSink;

impl JsonSink {
    pub fn new() -> Self {
        Self
    }

    /// Serializza un evento in una singola riga
    pub fn render(event: &SessionEvent) -> Option<String> {
        match serde_json::to_string(event) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("Failed to serialize event: {}", e);
                None
            }
        }
    }

    /// Scrive una riga e fa flush, così ogni evento arriva subito al consumer
    pub fn write_line<W: Write>(out: &mut W, line: &str) -> std::io::Result<()> {
        writeln!(out, "{}", line)?;
        out.flush()
    }
}

impl EventSink for JsonSink {
    fn on_event(&self, event: &SessionEvent) {
        if let Some(json) = Self::render(event) {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = Self::write_line(&mut stdout, &json) {
                warn!("Failed to write event to stdout: {}", e);
            }
        }
    }
}
