//! Progress-callback trait for per-document extraction events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks each catalog through its extraction stages.
//!
//! # Example
//!
//! ```rust
//! use catalog_feed::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SemanticCounter {
//!     chunks: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for SemanticCounter {
//!     fn on_chunk_start(&self, _document: &str, chunk: usize, total_chunks: usize) {
//!         self.chunks.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("chunk {chunk}/{total_chunks}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(SemanticCounter { chunks: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::record::ExtractionMethod;
use std::sync::Arc;

/// Called by the pipeline as it processes each catalog document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The pipeline is sequential, so events for one
/// document never interleave with another's.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once after price lists are merged, before any catalog.
    ///
    /// # Arguments
    /// * `total_documents`: catalogs that will be processed
    /// * `price_entries`: keys in the merged price map
    fn on_run_start(&self, total_documents: usize, price_entries: usize) {
        let _ = (total_documents, price_entries);
    }

    /// Called when a catalog document is picked up.
    fn on_document_start(&self, document: &str, index: usize, total_documents: usize) {
        let _ = (document, index, total_documents);
    }

    /// Called each time the state machine enters an extraction stage.
    fn on_stage_attempt(&self, document: &str, stage: ExtractionMethod) {
        let _ = (document, stage);
    }

    /// Called before each semantic chunk request (1-indexed).
    fn on_chunk_start(&self, document: &str, chunk: usize, total_chunks: usize) {
        let _ = (document, chunk, total_chunks);
    }

    /// Called when a document produced records.
    ///
    /// # Arguments
    /// * `records`: records emitted
    /// * `rejected`: rows dropped for an empty item_id
    fn on_document_complete(&self, document: &str, records: usize, rejected: usize) {
        let _ = (document, records, rejected);
    }

    /// Called when a document failed fatally.
    fn on_document_error(&self, document: &str, error: &str) {
        let _ = (document, error);
    }

    /// Called once after every document has been attempted.
    fn on_run_complete(&self, total_documents: usize, committed_records: usize) {
        let _ = (total_documents, committed_records);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
