//! Semantic extraction: chunked catalog text → language model → objects.
//!
//! The last stage of the fallback chain, used only when neither the table
//! detector nor the heuristic splitter found rows. Chunks are sent strictly
//! in order, one request at a time; the first chunk whose request fails or
//! whose reply cannot be parsed ends the stage with
//! [`CatalogError::SemanticExtractionFailed`], carrying the raw reply.

use crate::config::PipelineConfig;
use crate::error::CatalogError;
use crate::pipeline::chunk::{chunk_text, TokenCounter};
use crate::pipeline::llm::CompletionService;
use crate::pipeline::reply::parse_reply;
use crate::prompts::{build_user_message, DEFAULT_SYSTEM_PROMPT};
use crate::record::{ExtractedRows, ExtractionMethod, ExtractionResult, PriceMap};
use crate::schema::FieldSchema;
use tracing::{debug, info, warn};

/// Request accounting for one document's semantic stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SemanticUsage {
    pub chunks: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Everything the semantic stage needs besides the text itself.
pub struct SemanticContext<'a> {
    pub document: &'a str,
    pub price_map: &'a PriceMap,
    pub schema: &'a FieldSchema,
    pub counter: &'a dyn TokenCounter,
    pub service: &'a dyn CompletionService,
    pub config: &'a PipelineConfig,
}

/// Run the semantic stage over a document's full text.
pub async fn extract_semantic(
    text: &str,
    ctx: &SemanticContext<'_>,
) -> Result<(ExtractionResult, SemanticUsage), CatalogError> {
    let system = ctx
        .config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let schema_json = ctx.schema.to_json().to_string();
    let price_json = serde_json::to_string(ctx.price_map)?;

    let chunks = chunk_text(text, ctx.config.chunk_token_budget, ctx.counter);
    let total = chunks.len();
    info!("'{}': semantic stage over {} chunks", ctx.document, total);

    let mut usage = SemanticUsage::default();
    let mut objects = Vec::new();

    for (idx, chunk) in chunks.iter().enumerate() {
        let chunk_num = idx + 1;
        if let Some(ref cb) = ctx.config.progress_callback {
            cb.on_chunk_start(ctx.document, chunk_num, total);
        }

        let user = build_user_message(&schema_json, &price_json, chunk);
        let completion = ctx.service.complete(system, &user).await.map_err(|e| {
            warn!("'{}': chunk {} request failed: {}", ctx.document, chunk_num, e);
            CatalogError::SemanticExtractionFailed {
                document: ctx.document.to_string(),
                chunk: chunk_num,
                detail: format!("completion request failed: {e}"),
                raw_reply: String::new(),
            }
        })?;

        usage.chunks += 1;
        usage.input_tokens += completion.prompt_tokens as u64;
        usage.output_tokens += completion.completion_tokens as u64;

        let parsed = parse_reply(&completion.content).map_err(|detail| {
            warn!("'{}': chunk {} reply unparseable: {}", ctx.document, chunk_num, detail);
            CatalogError::SemanticExtractionFailed {
                document: ctx.document.to_string(),
                chunk: chunk_num,
                detail,
                raw_reply: completion.content.clone(),
            }
        })?;

        debug!(
            "'{}': chunk {}/{} gave {} objects",
            ctx.document,
            chunk_num,
            total,
            parsed.len()
        );
        objects.extend(parsed);
    }

    Ok((
        ExtractionResult {
            method: ExtractionMethod::Semantic,
            rows: ExtractedRows::Structured {
                source: ctx.document.to_string(),
                objects,
            },
        },
        usage,
    ))
}
