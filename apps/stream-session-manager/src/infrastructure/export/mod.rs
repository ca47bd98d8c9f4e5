//! CSV Export Pipeline
//!
//! Materializes a session's event buffer into a durable CSV artifact
//! and resets the buffer, atomically with respect to the caller: either
//! the whole buffer is exported and cleared, or — on any failure — the
//! buffer is left untouched so a retry is possible.
//!
//! # Artifact format
//!
//! Header row = the union of top-level field names across the exported
//! events, in first-seen order. One data row per event in buffer order;
//! fields missing from a given event are emitted empty; quoting is the
//! `csv` crate's standard behavior (fields containing the delimiter are
//! quoted). An empty buffer exports to an empty artifact.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde_json::Value;

use crate::application::services::session::{Session, SessionError};
use crate::domain::event::MarketEvent;
use crate::domain::subscription::SubscriptionSpec;

// =============================================================================
// Errors
// =============================================================================

/// Errors reported by the export pipeline. None of them clears the
/// buffer.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// A buffered event has no tabular representation (not a JSON
    /// object, or a field holds a nested array/object). Fix or drop the
    /// offending data, then retry; the buffer is intact.
    #[error("cannot represent event as a tabular row: {reason}")]
    Serialization {
        /// What made the event unrepresentable.
        reason: String,
    },

    /// Writing the artifact failed.
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error around the artifact.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The session is closed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

// =============================================================================
// Artifact Location
// =============================================================================

/// Where an export call landed, and how much it wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    path: PathBuf,
    rows: usize,
}

impl ArtifactLocation {
    /// Path of the written artifact.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data rows written (excluding the header).
    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.rows
    }
}

// =============================================================================
// Exporter
// =============================================================================

/// CSV exporter writing one artifact per export call under a fixed
/// directory, named `{channel}-{utc timestamp}-{seq}.csv`.
#[derive(Debug)]
pub struct CsvExporter {
    export_dir: PathBuf,
    seq: AtomicU64,
}

impl CsvExporter {
    /// Create an exporter, creating the export directory if needed.
    ///
    /// # Errors
    ///
    /// `ExportError::Io` if the directory cannot be created.
    pub fn new(export_dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let export_dir = export_dir.into();
        std::fs::create_dir_all(&export_dir)?;
        Ok(Self {
            export_dir,
            seq: AtomicU64::new(0),
        })
    }

    /// Export the session's buffer and clear it.
    ///
    /// Serialization, file write, and the buffer swap all happen under
    /// the buffer lock, so concurrent callers observe either the
    /// pre-export or the post-export buffer, never a partially drained
    /// one.
    ///
    /// # Errors
    ///
    /// `Serialization` / `Csv` / `Io` leave the buffer untouched;
    /// `Session` if the session is already closed.
    pub fn export(&self, session: &Session) -> Result<ArtifactLocation, ExportError> {
        let spec = session.spec().clone();
        let location =
            session.with_buffer(|buffer| self.write_artifact(&spec, buffer))??;

        tracing::info!(
            channel = %spec.channel(),
            rows = location.row_count(),
            path = %location.path().display(),
            "buffer exported"
        );
        Ok(location)
    }

    /// Serialize and persist `buffer`, clearing it only after the
    /// artifact is durably written.
    fn write_artifact(
        &self,
        spec: &SubscriptionSpec,
        buffer: &mut Vec<MarketEvent>,
    ) -> Result<ArtifactLocation, ExportError> {
        // Validate and render everything before touching the filesystem,
        // so a serialization fault leaves no partial artifact behind.
        let columns = collect_columns(buffer)?;
        let rows = buffer
            .iter()
            .map(|event| event_row(event, &columns))
            .collect::<Result<Vec<_>, _>>()?;

        let path = self.artifact_path(spec);
        let mut writer = csv::Writer::from_path(&path)?;
        if !columns.is_empty() {
            writer.write_record(&columns)?;
        }
        for row in &rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        let exported = std::mem::take(buffer);
        Ok(ArtifactLocation {
            path,
            rows: exported.len(),
        })
    }

    fn artifact_path(&self, spec: &SubscriptionSpec) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.export_dir
            .join(format!("{}-{stamp}-{seq}.csv", spec.channel()))
    }
}

/// Union of top-level field names across `events`, in first-seen order.
fn collect_columns(events: &[MarketEvent]) -> Result<Vec<String>, ExportError> {
    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    for event in events {
        let Value::Object(fields) = event.as_json() else {
            return Err(ExportError::Serialization {
                reason: format!("event is not an object: {}", event.as_json()),
            });
        };
        for key in fields.keys() {
            if seen.insert(key.clone()) {
                columns.push(key.clone());
            }
        }
    }
    Ok(columns)
}

/// Render one event as a row over `columns`; absent fields are empty.
fn event_row(event: &MarketEvent, columns: &[String]) -> Result<Vec<String>, ExportError> {
    let Value::Object(fields) = event.as_json() else {
        return Err(ExportError::Serialization {
            reason: format!("event is not an object: {}", event.as_json()),
        });
    };
    columns
        .iter()
        .map(|column| fields.get(column).map_or_else(|| Ok(String::new()), cell))
        .collect()
}

/// Render one scalar JSON value as a CSV cell.
fn cell(value: &Value) -> Result<String, ExportError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Array(_) | Value::Object(_) => Err(ExportError::Serialization {
            reason: format!("nested value has no tabular equivalent: {value}"),
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn events(values: &[Value]) -> Vec<MarketEvent> {
        values.iter().cloned().map(MarketEvent::new).collect()
    }

    #[test]
    fn columns_come_out_in_first_seen_order() {
        let events = events(&[
            json!({"p": 1, "q": 2}),
            json!({"q": 3, "r": 4}),
            json!({"s": 5}),
        ]);
        let columns = collect_columns(&events).unwrap();
        assert_eq!(columns, vec!["p", "q", "r", "s"]);
    }

    #[test]
    fn missing_fields_render_empty() {
        let event = MarketEvent::new(json!({"q": 7}));
        let row = event_row(&event, &["p".to_string(), "q".to_string()]).unwrap();
        assert_eq!(row, vec!["", "7"]);
    }

    #[test]
    fn scalar_cells_render_plainly() {
        assert_eq!(cell(&json!(null)).unwrap(), "");
        assert_eq!(cell(&json!(true)).unwrap(), "true");
        assert_eq!(cell(&json!(101)).unwrap(), "101");
        assert_eq!(cell(&json!(1.5)).unwrap(), "1.5");
        assert_eq!(cell(&json!("a,b")).unwrap(), "a,b");
    }

    #[test]
    fn nested_values_are_unrepresentable() {
        assert!(matches!(
            cell(&json!({"inner": 1})),
            Err(ExportError::Serialization { .. })
        ));
        assert!(matches!(
            cell(&json!([1, 2])),
            Err(ExportError::Serialization { .. })
        ));
    }

    #[test]
    fn non_object_event_is_unrepresentable() {
        let events = events(&[json!("raw frame")]);
        assert!(matches!(
            collect_columns(&events),
            Err(ExportError::Serialization { .. })
        ));
    }

    #[test]
    fn artifact_paths_are_unique_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path()).unwrap();
        let spec: SubscriptionSpec = "binance.spot.book.BTCUSDT".parse().unwrap();

        let a = exporter.artifact_path(&spec);
        let b = exporter.artifact_path(&spec);
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("binance.spot.book.BTCUSDT-"));
    }
}
