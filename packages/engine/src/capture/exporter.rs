// packages/engine/src/capture/exporter.rs
//! Export capture snapshots
//!
//! Supports:
//! - JSON (full snapshot, machine readable)
//! - Hex (one line per slot, newest slot marked)

use crate::capture::capture_buffer::CaptureSnapshot;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Pretty-printed JSON
    #[default]
    Json,

    /// Hex table
    Hex,
}

/// Exporter for capture snapshots
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    /// Create a new exporter
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// Export a snapshot to string
    pub fn export(&self, snapshot: &CaptureSnapshot) -> Result<String> {
        debug!(
            "Exporting capture snapshot ({} of {} slots used) to {:?} format",
            snapshot.len(),
            snapshot.capacity,
            self.format
        );

        match self.format {
            ExportFormat::Json => self.export_json(snapshot),
            ExportFormat::Hex => self.export_hex(snapshot),
        }
    }

    /// Export a snapshot and write it to `path`
    pub fn export_to_file(&self, snapshot: &CaptureSnapshot, path: &Path) -> Result<()> {
        let rendered = self.export(snapshot)?;
        std::fs::write(path, rendered)?;
        info!("Capture history written to {}", path.display());
        Ok(())
    }

    fn export_json(&self, snapshot: &CaptureSnapshot) -> Result<String> {
        serde_json::to_string_pretty(snapshot).map_err(|e| {
            EngineError::ExportFailed(format!("JSON serialization error: {}", e))
        })
    }

    fn export_hex(&self, snapshot: &CaptureSnapshot) -> Result<String> {
        let mut out = String::new();
        let index_width = snapshot.capacity.saturating_sub(1).to_string().len();

        writeln!(
            out,
            "# capture snapshot {} | slots={} slot_size={} cursor={} recorded={}",
            snapshot.taken_at.to_rfc3339(),
            snapshot.capacity,
            snapshot.slot_size,
            snapshot.cursor,
            snapshot.total_recorded
        )
        .map_err(|e| EngineError::ExportFailed(e.to_string()))?;

        for (index, slot) in snapshot.slots.iter().enumerate() {
            let bytes = slot
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            let marker = if !snapshot.is_empty() && index == snapshot.cursor {
                "  <- newest"
            } else {
                ""
            };
            writeln!(out, "{:>width$} | {}{}", index, bytes, marker, width = index_width)
                .map_err(|e| EngineError::ExportFailed(e.to_string()))?;
        }

        Ok(out)
    }
}
