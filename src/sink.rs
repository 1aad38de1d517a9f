//! Feed sinks: where committed records go.
//!
//! The pipeline hands each document's records to a [`FeedSink`] together
//! with the destination [`FeedSchema`]. When that happens is decided by
//! [`crate::config::CommitPolicy`]; the sink only has to persist what it is
//! given.

use crate::error::CatalogError;
use crate::record::ProductRecord;
use crate::schema::FeedSchema;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Accepts normalized records for a destination schema.
pub trait FeedSink: Send {
    /// Persist one document's records. Called once per committed document,
    /// in document order.
    fn commit(
        &mut self,
        schema: &FeedSchema,
        document: &str,
        records: &[ProductRecord],
    ) -> Result<(), CatalogError>;
}

/// Keeps committed records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub batches: Vec<(String, Vec<ProductRecord>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed record, in commit order.
    pub fn records(&self) -> Vec<&ProductRecord> {
        self.batches.iter().flat_map(|(_, r)| r.iter()).collect()
    }
}

impl FeedSink for MemorySink {
    fn commit(
        &mut self,
        _schema: &FeedSchema,
        document: &str,
        records: &[ProductRecord],
    ) -> Result<(), CatalogError> {
        self.batches.push((document.to_string(), records.to_vec()));
        Ok(())
    }
}

/// Writes the feed as a JSON document, rewritten atomically on every commit
/// so the file on disk is always complete.
#[derive(Debug)]
pub struct JsonFeedSink {
    path: PathBuf,
    rows: Vec<FeedRow>,
}

#[derive(Debug, Clone, Serialize)]
struct FeedRow {
    document: String,
    values: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct FeedFile<'a> {
    schema: &'a str,
    columns: Vec<ColumnHeader<'a>>,
    rows: &'a [FeedRow],
}

#[derive(Serialize)]
struct ColumnHeader<'a> {
    letter: &'a str,
    label: &'a str,
}

impl JsonFeedSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, schema: &FeedSchema) -> Result<(), CatalogError> {
        let file = FeedFile {
            schema: &schema.name,
            columns: schema
                .columns
                .iter()
                .map(|c| ColumnHeader {
                    letter: &c.letter,
                    label: &c.label,
                })
                .collect(),
            rows: &self.rows,
        };
        let json = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &json)
    }
}

impl FeedSink for JsonFeedSink {
    fn commit(
        &mut self,
        schema: &FeedSchema,
        document: &str,
        records: &[ProductRecord],
    ) -> Result<(), CatalogError> {
        for record in records {
            let values = schema
                .columns
                .iter()
                .zip(schema.row_for(record))
                .map(|(col, value)| (col.label.clone(), serde_json::Value::String(value)))
                .collect();
            self.rows.push(FeedRow {
                document: document.to_string(),
                values,
            });
        }
        self.write(schema)?;
        info!(
            "Committed {} records from '{}' to {}",
            records.len(),
            document,
            self.path.display()
        );
        Ok(())
    }
}

/// Write via a temp file in the target directory, then rename over the
/// target. Readers never see a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CatalogError> {
    let io_err = |source: std::io::Error| CatalogError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
