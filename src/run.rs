//! Run orchestration: price lists + catalogs → committed feed records.
//!
//! A run is strictly sequential:
//!
//! 1. validate that catalogs, price lists and a destination schema exist;
//! 2. parse and merge every price list into one frozen [`PriceMap`];
//! 3. for each catalog, in order: read its layout, walk the extraction
//!    state machine, normalize and reconcile the rows;
//! 4. hand records to the [`FeedSink`] according to the [`CommitPolicy`].
//!
//! A fatal error in one catalog is recorded in its [`DocumentOutcome`] and
//! the run moves on. Only input validation, price-list reading and sink
//! writes abort the whole run.

use crate::config::{CommitPolicy, PipelineConfig};
use crate::error::{CatalogError, StageError};
use crate::pipeline::chunk::{token_counter, TokenCounter};
use crate::pipeline::input::{self, CatalogDocument};
use crate::pipeline::layout::{read_layout, DocumentLayout, LayoutReader, PdfiumLayoutReader};
use crate::pipeline::llm::{resolve_provider, CompletionService, LlmCompletionService};
use crate::pipeline::normalize::normalize;
use crate::pipeline::reconcile::PriceReconciler;
use crate::pipeline::semantic::{extract_semantic, SemanticContext, SemanticUsage};
use crate::pipeline::{heuristic, table};
use crate::pricelist::{build_price_map, PriceSource};
use crate::record::{
    BatchReport, DocumentOutcome, ExtractionMethod, ExtractionResult, PriceListReport, PriceMap,
    ProductRecord,
};
use crate::schema::{FeedSchema, FieldSchema};
use crate::sink::FeedSink;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Inputs ───────────────────────────────────────────────────────────────

/// A catalog to process: either still to be loaded, or already in memory.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    /// Local path or HTTP(S) URL, loaded when the document's turn comes.
    Location(String),
    Document(CatalogDocument),
}

impl CatalogSource {
    /// Display name used in logs and outcomes.
    pub fn name(&self) -> String {
        match self {
            CatalogSource::Document(doc) => doc.name.clone(),
            CatalogSource::Location(loc) if input::is_url(loc) => loc.clone(),
            CatalogSource::Location(loc) => Path::new(loc)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| loc.clone()),
        }
    }
}

/// Everything one run consumes.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub catalogs: Vec<CatalogSource>,
    pub price_sources: Vec<PriceSource>,
    pub schema: Option<FeedSchema>,
}

impl RunInputs {
    /// Resolve user-supplied locations. Price lists are loaded now, since
    /// every catalog needs them; catalogs are loaded one at a time later.
    pub async fn load(
        catalogs: &[String],
        price_lists: &[String],
        schema: Option<FeedSchema>,
        timeout_secs: u64,
    ) -> Result<Self, CatalogError> {
        let mut price_sources = Vec::with_capacity(price_lists.len());
        for location in price_lists {
            price_sources.push(input::load_price_source(location, timeout_secs).await?);
        }
        Ok(Self {
            catalogs: catalogs
                .iter()
                .cloned()
                .map(CatalogSource::Location)
                .collect(),
            price_sources,
            schema,
        })
    }

    /// Fail fast when any required input is absent.
    fn validate(&self) -> Result<&FeedSchema, CatalogError> {
        if self.catalogs.is_empty() {
            return Err(CatalogError::MissingRequiredInput {
                what: "catalog document".into(),
            });
        }
        if self.price_sources.is_empty() {
            return Err(CatalogError::MissingRequiredInput {
                what: "price list".into(),
            });
        }
        self.schema
            .as_ref()
            .ok_or_else(|| CatalogError::MissingRequiredInput {
                what: "destination feed schema".into(),
            })
    }
}

// ── Extraction state machine ─────────────────────────────────────────────

/// Where one document is in the fallback chain.
#[derive(Debug)]
enum ExtractionState {
    TableAttempt,
    HeuristicAttempt,
    SemanticAttempt,
    Succeeded(ExtractionResult),
    Failed(CatalogError),
}

/// What the current stage reported.
#[derive(Debug)]
enum Transition {
    NoTableFound,
    NoRowsFound,
    SemanticExtractionFailed(CatalogError),
    Extracted(ExtractionResult),
}

impl From<StageError> for Transition {
    fn from(e: StageError) -> Self {
        match e {
            StageError::NoTableFound => Transition::NoTableFound,
            StageError::NoRowsFound => Transition::NoRowsFound,
        }
    }
}

fn advance(state: ExtractionState, transition: Transition, document: &str) -> ExtractionState {
    use ExtractionState as S;
    use Transition as T;

    match (state, transition) {
        (S::TableAttempt | S::HeuristicAttempt | S::SemanticAttempt, T::Extracted(result)) => {
            S::Succeeded(result)
        }
        (S::TableAttempt, T::NoTableFound) => S::HeuristicAttempt,
        (S::HeuristicAttempt, T::NoRowsFound) => S::SemanticAttempt,
        (S::SemanticAttempt, T::NoRowsFound) => S::Failed(CatalogError::NoRowsFound {
            document: document.to_string(),
            reason: "no table or candidate rows, and semantic extraction is disabled or has no provider"
                .into(),
        }),
        (S::SemanticAttempt, T::SemanticExtractionFailed(e)) => S::Failed(e),
        (state, transition) => S::Failed(CatalogError::Internal(format!(
            "invalid extraction transition {:?} from {:?}",
            transition, state
        ))),
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Shared, read-only state for every document of one run.
struct RunContext {
    price_map: Arc<PriceMap>,
    reconciler: PriceReconciler,
    field_schema: FieldSchema,
}

/// The catalog extraction pipeline with its collaborators wired in.
pub struct CatalogPipeline {
    config: PipelineConfig,
    reader: Arc<dyn LayoutReader>,
    service: Option<Arc<dyn CompletionService>>,
    counter: Arc<dyn TokenCounter>,
}

impl CatalogPipeline {
    /// Production wiring: pdfium layouts, the configured LLM provider and
    /// tokenizer.
    pub fn new(config: PipelineConfig) -> Result<Self, CatalogError> {
        Self::builder(config).build()
    }

    pub fn builder(config: PipelineConfig) -> CatalogPipelineBuilder {
        CatalogPipelineBuilder {
            config,
            reader: None,
            service: None,
            counter: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parse and merge price lists without touching any catalog.
    pub fn inspect_prices(
        &self,
        sources: &[PriceSource],
    ) -> Result<(PriceMap, PriceListReport), CatalogError> {
        build_price_map(sources, self.config.duplicate_keys)
    }

    /// Run the whole batch.
    ///
    /// # Errors
    /// Missing inputs, unreadable price lists and sink failures. Per-document
    /// failures are reported in the returned [`BatchReport`] instead.
    pub async fn run(
        &self,
        inputs: &RunInputs,
        sink: &mut dyn FeedSink,
    ) -> Result<BatchReport, CatalogError> {
        let start = Instant::now();
        let schema = inputs.validate()?;

        // ── Step 1: Price map ────────────────────────────────────────────
        let (price_map, prices) = self.inspect_prices(&inputs.price_sources)?;
        let price_map = Arc::new(price_map);

        let ctx = RunContext {
            reconciler: PriceReconciler::new(
                Arc::clone(&price_map),
                self.config.secondary_key.clone(),
                self.config.price_precision,
            ),
            price_map,
            field_schema: FieldSchema::product_record(&schema.param_keys()),
        };

        let total = inputs.catalogs.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(total, ctx.price_map.len());
        }

        // ── Step 2: Documents, one at a time ─────────────────────────────
        let mut report = BatchReport {
            prices,
            ..Default::default()
        };
        let mut pending: Vec<(String, Vec<ProductRecord>)> = Vec::new();

        for (idx, source) in inputs.catalogs.iter().enumerate() {
            let name = source.name();
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_document_start(&name, idx + 1, total);
            }

            let (outcome, records) = self.process_document(source, &ctx).await;

            if let Some(ref cb) = self.config.progress_callback {
                match &outcome.error {
                    None => cb.on_document_complete(&outcome.document, outcome.records, outcome.rejected),
                    Some(e) => cb.on_document_error(&outcome.document, e),
                }
            }

            if outcome.succeeded() {
                match self.config.commit_policy {
                    CommitPolicy::PerDocument => {
                        sink.commit(schema, &outcome.document, &records)?;
                        report.committed_records += records.len();
                    }
                    CommitPolicy::AllOrNothing => pending.push((outcome.document.clone(), records)),
                }
            }
            report.documents.push(outcome);
        }

        // ── Step 3: Deferred commit ──────────────────────────────────────
        if self.config.commit_policy == CommitPolicy::AllOrNothing {
            let failed = report.failed_documents();
            if failed == 0 {
                for (document, records) in &pending {
                    sink.commit(schema, document, records)?;
                    report.committed_records += records.len();
                }
            } else {
                warn!(
                    "{} of {} documents failed; nothing committed (all-or-nothing)",
                    failed, total
                );
            }
        }

        report.total_duration_ms = start.elapsed().as_millis() as u64;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(total, report.committed_records);
        }
        info!(
            "Run complete: {} documents, {} failed, {} records committed in {}ms",
            total,
            report.failed_documents(),
            report.committed_records,
            report.total_duration_ms
        );
        Ok(report)
    }

    /// Process one catalog. Never fails: errors land in the outcome.
    async fn process_document(
        &self,
        source: &CatalogSource,
        ctx: &RunContext,
    ) -> (DocumentOutcome, Vec<ProductRecord>) {
        let start = Instant::now();
        let mut outcome = DocumentOutcome {
            document: source.name(),
            ..Default::default()
        };

        let records = match self.extract_document(source, ctx, &mut outcome).await {
            Ok(records) => records,
            Err(e) => {
                warn!("'{}' failed: {}", outcome.document, e);
                outcome.error = Some(e.to_string());
                Vec::new()
            }
        };

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        (outcome, records)
    }

    async fn extract_document(
        &self,
        source: &CatalogSource,
        ctx: &RunContext,
        outcome: &mut DocumentOutcome,
    ) -> Result<Vec<ProductRecord>, CatalogError> {
        // ── Load + layout ────────────────────────────────────────────────
        let document = match source {
            CatalogSource::Document(doc) => doc.clone(),
            CatalogSource::Location(loc) => {
                input::load_catalog(loc, self.config.download_timeout_secs).await?
            }
        };
        outcome.document = document.name.clone();

        let layout = read_layout(
            Arc::clone(&self.reader),
            &document,
            self.config.password.as_deref(),
        )
        .await?;
        if layout.is_blank() {
            warn!("'{}' has no extractable text", document.name);
        }

        // ── Extraction ───────────────────────────────────────────────────
        let (result, usage) = self.extract_rows(&document.name, &layout, ctx, outcome).await?;
        outcome.method = Some(result.method);
        outcome.chunks = usage.chunks;
        outcome.input_tokens = usage.input_tokens;
        outcome.output_tokens = usage.output_tokens;

        // ── Normalize + reconcile ────────────────────────────────────────
        let normalized = normalize(&result);
        outcome.rejected = normalized.rejected;
        outcome.duplicates = normalized.duplicates;

        let mut records = Vec::with_capacity(normalized.records.len());
        for record in normalized.records {
            let (record, from_map) = ctx.reconciler.reconcile(record);
            outcome.priced_from_map += usize::from(from_map);
            records.push(record);
        }
        outcome.records = records.len();

        if records.is_empty() {
            warn!(
                "'{}': {} stage produced no usable records",
                document.name, result.method
            );
        }
        info!(
            "'{}': {} records via {} stage ({} priced from list, {} rejected, {} duplicates)",
            document.name,
            outcome.records,
            result.method,
            outcome.priced_from_map,
            outcome.rejected,
            outcome.duplicates
        );
        Ok(records)
    }

    /// Walk the fallback chain until a stage extracts rows or the chain fails.
    async fn extract_rows(
        &self,
        document: &str,
        layout: &DocumentLayout,
        ctx: &RunContext,
        outcome: &mut DocumentOutcome,
    ) -> Result<(ExtractionResult, SemanticUsage), CatalogError> {
        let mut state = ExtractionState::TableAttempt;
        let mut usage = SemanticUsage::default();

        loop {
            let transition = match state {
                ExtractionState::TableAttempt => {
                    self.enter_stage(document, ExtractionMethod::Table, outcome);
                    match table::extract_table(
                        layout,
                        document,
                        self.config.table_min_rows,
                        self.config.column_tolerance,
                    ) {
                        Ok(result) => Transition::Extracted(result),
                        Err(e) => e.into(),
                    }
                }
                ExtractionState::HeuristicAttempt => {
                    self.enter_stage(document, ExtractionMethod::Heuristic, outcome);
                    match heuristic::extract_lines(&layout.full_text(), document) {
                        Ok(result) => Transition::Extracted(result),
                        Err(e) => e.into(),
                    }
                }
                ExtractionState::SemanticAttempt => {
                    self.enter_stage(document, ExtractionMethod::Semantic, outcome);
                    match self.semantic_service() {
                        None => Transition::NoRowsFound,
                        Some(service) => {
                            let sctx = SemanticContext {
                                document,
                                price_map: &ctx.price_map,
                                schema: &ctx.field_schema,
                                counter: self.counter.as_ref(),
                                service,
                                config: &self.config,
                            };
                            match extract_semantic(&layout.full_text(), &sctx).await {
                                Ok((result, used)) => {
                                    usage = used;
                                    Transition::Extracted(result)
                                }
                                Err(e) => Transition::SemanticExtractionFailed(e),
                            }
                        }
                    }
                }
                ExtractionState::Succeeded(result) => return Ok((result, usage)),
                ExtractionState::Failed(e) => return Err(e),
            };

            debug!("'{}': {:?} → {}", document, state, transition_name(&transition));
            state = advance(state, transition, document);
        }
    }

    fn enter_stage(&self, document: &str, stage: ExtractionMethod, outcome: &mut DocumentOutcome) {
        debug!("'{}': trying {} stage", document, stage);
        outcome.attempts.push(stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_attempt(document, stage);
        }
    }

    fn semantic_service(&self) -> Option<&dyn CompletionService> {
        if !self.config.semantic_enabled {
            return None;
        }
        self.service.as_deref()
    }
}

fn transition_name(t: &Transition) -> &'static str {
    match t {
        Transition::NoTableFound => "NoTableFound",
        Transition::NoRowsFound => "NoRowsFound",
        Transition::SemanticExtractionFailed(_) => "SemanticExtractionFailed",
        Transition::Extracted(_) => "Extracted",
    }
}

/// Builder for [`CatalogPipeline`]; every collaborator is optional.
pub struct CatalogPipelineBuilder {
    config: PipelineConfig,
    reader: Option<Arc<dyn LayoutReader>>,
    service: Option<Arc<dyn CompletionService>>,
    counter: Option<Arc<dyn TokenCounter>>,
}

impl CatalogPipelineBuilder {
    pub fn layout_reader(mut self, reader: Arc<dyn LayoutReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn completion_service(mut self, service: Arc<dyn CompletionService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Fill in production defaults for anything not supplied.
    ///
    /// A missing LLM provider is not an error here: the semantic stage is
    /// simply unavailable, and documents needing it fail with
    /// [`CatalogError::NoRowsFound`].
    pub fn build(self) -> Result<CatalogPipeline, CatalogError> {
        let counter = match self.counter {
            Some(c) => c,
            None => Arc::from(token_counter(self.config.tokenizer_path.as_deref())?),
        };

        let service = match self.service {
            Some(s) => Some(s),
            None if self.config.semantic_enabled => match resolve_provider(&self.config) {
                Ok(provider) => {
                    let service: Arc<dyn CompletionService> =
                        Arc::new(LlmCompletionService::new(provider, &self.config));
                    Some(service)
                }
                Err(e) => {
                    warn!("Semantic extraction unavailable: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(CatalogPipeline {
            reader: self
                .reader
                .unwrap_or_else(|| Arc::new(PdfiumLayoutReader)),
            service,
            counter,
            config: self.config,
        })
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Run a batch with production wiring.
///
/// # Example
/// ```rust,no_run
/// use catalog_feed::{run_batch, FeedSchema, JsonFeedSink, PipelineConfig, RunInputs};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let inputs = RunInputs::load(
///         &["catalog.pdf".to_string()],
///         &["cenik.txt".to_string()],
///         Some(FeedSchema::heureka()),
///         120,
///     )
///     .await?;
///     let mut sink = JsonFeedSink::new("feed.json");
///     let report = run_batch(PipelineConfig::default(), &inputs, &mut sink).await?;
///     eprintln!("{} records committed", report.committed_records);
///     Ok(())
/// }
/// ```
pub async fn run_batch(
    config: PipelineConfig,
    inputs: &RunInputs,
    sink: &mut dyn FeedSink,
) -> Result<BatchReport, CatalogError> {
    CatalogPipeline::new(config)?.run(inputs, sink).await
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    config: PipelineConfig,
    inputs: &RunInputs,
    sink: &mut dyn FeedSink,
) -> Result<BatchReport, CatalogError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CatalogError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_batch(config, inputs, sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ExtractionResult {
        ExtractionResult {
            method: ExtractionMethod::Heuristic,
            rows: crate::record::ExtractedRows::Tabular {
                columns: vec![],
                rows: vec![],
            },
        }
    }

    #[test]
    fn fallback_order_is_table_heuristic_semantic() {
        let s = advance(ExtractionState::TableAttempt, Transition::NoTableFound, "d");
        assert!(matches!(s, ExtractionState::HeuristicAttempt));
        let s = advance(s, Transition::NoRowsFound, "d");
        assert!(matches!(s, ExtractionState::SemanticAttempt));
        let s = advance(s, Transition::Extracted(result()), "d");
        assert!(matches!(s, ExtractionState::Succeeded(_)));
    }

    #[test]
    fn semantic_without_rows_fails_with_no_rows_found() {
        let s = advance(ExtractionState::SemanticAttempt, Transition::NoRowsFound, "d");
        assert!(matches!(s, ExtractionState::Failed(CatalogError::NoRowsFound { .. })));
    }

    #[test]
    fn out_of_order_transition_is_internal_error() {
        let s = advance(ExtractionState::TableAttempt, Transition::NoRowsFound, "d");
        assert!(matches!(s, ExtractionState::Failed(CatalogError::Internal(_))));
    }

    #[test]
    fn validation_names_the_missing_input() {
        let inputs = RunInputs {
            catalogs: vec![CatalogSource::Location("a.pdf".into())],
            price_sources: vec![],
            schema: Some(FeedSchema::heureka()),
        };
        match inputs.validate().unwrap_err() {
            CatalogError::MissingRequiredInput { what } => assert_eq!(what, "price list"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn source_names() {
        assert_eq!(CatalogSource::Location("/tmp/x/cat.pdf".into()).name(), "cat.pdf");
        assert_eq!(
            CatalogSource::Location("https://h/c.pdf".into()).name(),
            "https://h/c.pdf"
        );
    }
}
