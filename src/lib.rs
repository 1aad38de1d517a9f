//! # catalog-feed
//!
//! Turn supplier product catalogs (PDF) and their price lists into canonical
//! product records for an e-shop feed.
//!
//! ## Why this crate?
//!
//! No single extraction strategy handles every catalog layout. Some print a
//! clean price grid, some separate columns with nothing but whitespace, and
//! some are glossy brochures where products hide in running text. This crate
//! tries increasingly expensive strategies in order and stops at the first
//! one that finds rows, then unifies whatever it found into one schema and
//! fills in prices from an independently formatted price list.
//!
//! ## Pipeline Overview
//!
//! ```text
//! price lists ──▶ PriceMap (merged once, read-only)
//!                     │
//! catalog PDF         ▼
//!  │
//!  ├─ 1. Input      resolve local file or download from URL, check %PDF
//!  ├─ 2. Layout     positioned text lines via pdfium (spawn_blocking)
//!  ├─ 3. Table      aligned-column region detection
//!  ├─ 4. Heuristic  whitespace-run row splitting        (if 3 found nothing)
//!  ├─ 5. Semantic   token-bounded chunks → LLM → JSON   (if 4 found nothing)
//!  ├─ 6. Normalize  canonical ProductRecord, params for the rest
//!  ├─ 7. Reconcile  missing prices from the PriceMap, rounded
//!  └─ 8. Sink       committed per document or all-or-nothing
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use catalog_feed::{run_batch, FeedSchema, MemorySink, PipelineConfig, RunInputs};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let inputs = RunInputs::load(
//!         &["catalog.pdf".to_string()],
//!         &["cenik.txt".to_string()],
//!         Some(FeedSchema::heureka()),
//!         120,
//!     )
//!     .await?;
//!     let mut sink = MemorySink::new();
//!     let report = run_batch(PipelineConfig::default(), &inputs, &mut sink).await?;
//!     for doc in &report.documents {
//!         eprintln!("{}: {:?} → {} records", doc.document, doc.method, doc.records);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `catalog2feed` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! catalog-feed = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod pricelist;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod run;
pub mod schema;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CommitPolicy, DuplicateKeyPolicy, PipelineConfig, PipelineConfigBuilder};
pub use error::{CatalogError, PriceLineError, StageError};
pub use pipeline::chunk::{ApproxTokenCounter, HfTokenCounter, TokenCounter};
pub use pipeline::input::CatalogDocument;
pub use pipeline::layout::{DocumentLayout, LayoutReader, PageLayout, PdfiumLayoutReader};
pub use pipeline::llm::{Completion, CompletionService, LlmCompletionService};
pub use pricelist::{build_price_map, PriceSource};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use record::{
    BatchReport, CanonicalField, DocumentOutcome, ExtractionMethod, Params, PriceListReport,
    PriceMap, ProductRecord,
};
pub use run::{run_batch, run_sync, CatalogPipeline, CatalogPipelineBuilder, CatalogSource, RunInputs};
pub use schema::{FeedColumn, FeedSchema, FeedSource, FieldSchema};
pub use sink::{FeedSink, JsonFeedSink, MemorySink};
