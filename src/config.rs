//! Configuration types for catalog extraction runs.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`] and passed into [`crate::run::run_batch`].
//! Nothing is read from process-wide mutable state: the LLM provider, price
//! precision and fallback switches all travel inside this struct.

use crate::error::CatalogError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a catalog extraction run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use catalog_feed::{DuplicateKeyPolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .chunk_token_budget(1200)
///     .price_precision(2)
///     .duplicate_keys(DuplicateKeyPolicy::LastWins)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for semantic extraction. Default: 0.0.
    ///
    /// Extraction should copy values from the text, never invent them.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per chunk. Default: 4096.
    ///
    /// A 1500-token chunk of a dense price table can expand into a JSON
    /// array several times its size; a truncated reply cannot be parsed.
    pub max_tokens: usize,

    /// Custom system prompt for the semantic stage. If None, uses built-in default.
    pub system_prompt: Option<String>,

    /// Whether the semantic stage may run at all. Default: true.
    pub semantic_enabled: bool,

    /// Token budget per semantic chunk. Range: 100–32000. Default: 1500.
    pub chunk_token_budget: usize,

    /// Path to a HuggingFace `tokenizer.json` matching the model.
    /// If None, tokens are estimated from character counts.
    pub tokenizer_path: Option<PathBuf>,

    /// Decimal places prices are rounded to before storage. Range: 0–6. Default: 2.
    pub price_precision: u32,

    /// What to do when the same key appears in more than one price-list line.
    pub duplicate_keys: DuplicateKeyPolicy,

    /// Param used as the secondary price-map key when `item_id` has no
    /// price. Default: `size`.
    pub secondary_key: Option<String>,

    /// Minimum rows (header included) for a detected table region. Default: 2.
    pub table_min_rows: usize,

    /// Column start alignment tolerance in PDF points. Default: 6.0.
    pub column_tolerance: f32,

    /// When records reach the feed sink. Default: [`CommitPolicy::PerDocument`].
    pub commit_policy: CommitPolicy,

    /// PDF user password for encrypted catalogs.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress listener.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            system_prompt: None,
            semantic_enabled: true,
            chunk_token_budget: 1500,
            tokenizer_path: None,
            price_precision: 2,
            duplicate_keys: DuplicateKeyPolicy::default(),
            secondary_key: Some("size".to_string()),
            table_min_rows: 2,
            column_tolerance: 6.0,
            commit_policy: CommitPolicy::default(),
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("semantic_enabled", &self.semantic_enabled)
            .field("chunk_token_budget", &self.chunk_token_budget)
            .field("tokenizer_path", &self.tokenizer_path)
            .field("price_precision", &self.price_precision)
            .field("duplicate_keys", &self.duplicate_keys)
            .field("secondary_key", &self.secondary_key)
            .field("table_min_rows", &self.table_min_rows)
            .field("column_tolerance", &self.column_tolerance)
            .field("commit_policy", &self.commit_policy)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn semantic_enabled(mut self, v: bool) -> Self {
        self.config.semantic_enabled = v;
        self
    }

    pub fn chunk_token_budget(mut self, n: usize) -> Self {
        self.config.chunk_token_budget = n.clamp(100, 32_000);
        self
    }

    pub fn tokenizer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tokenizer_path = Some(path.into());
        self
    }

    pub fn price_precision(mut self, dp: u32) -> Self {
        self.config.price_precision = dp.min(6);
        self
    }

    pub fn duplicate_keys(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.config.duplicate_keys = policy;
        self
    }

    /// `None` disables the secondary lookup.
    pub fn secondary_key(mut self, key: Option<String>) -> Self {
        self.config.secondary_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn table_min_rows(mut self, n: usize) -> Self {
        self.config.table_min_rows = n.max(2);
        self
    }

    pub fn column_tolerance(mut self, points: f32) -> Self {
        self.config.column_tolerance = points.max(0.0);
        self
    }

    pub fn commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.config.commit_policy = policy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, CatalogError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(CatalogError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if !c.column_tolerance.is_finite() {
            return Err(CatalogError::InvalidConfig(format!(
                "column tolerance must be finite, got {}",
                c.column_tolerance
            )));
        }
        if let Some(ref path) = c.tokenizer_path {
            if !path.exists() {
                return Err(CatalogError::InvalidConfig(format!(
                    "tokenizer file '{}' does not exist",
                    path.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which value survives when a price key appears more than once.
///
/// Applies both within one price list and across several merged lists
/// (sources are merged in the order they were supplied).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicateKeyPolicy {
    /// Keep the first price seen. (default)
    #[default]
    FirstWins,
    /// Later lines overwrite earlier ones.
    LastWins,
}

/// When extracted records are handed to the feed sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommitPolicy {
    /// Commit each document's records as soon as it succeeds. A later
    /// failure does not roll back earlier documents. (default)
    #[default]
    PerDocument,
    /// Buffer every document; commit only if all of them succeeded.
    AllOrNothing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let c = PipelineConfig::default();
        assert_eq!(c.chunk_token_budget, 1500);
        assert_eq!(c.price_precision, 2);
        assert_eq!(c.duplicate_keys, DuplicateKeyPolicy::FirstWins);
        assert_eq!(c.commit_policy, CommitPolicy::PerDocument);
        assert_eq!(c.secondary_key.as_deref(), Some("size"));
        assert!(c.semantic_enabled);
    }

    #[test]
    fn builder_clamps_values() {
        let c = PipelineConfig::builder()
            .chunk_token_budget(5)
            .price_precision(12)
            .table_min_rows(0)
            .temperature(9.0)
            .build()
            .unwrap();
        assert_eq!(c.chunk_token_budget, 100);
        assert_eq!(c.price_precision, 6);
        assert_eq!(c.table_min_rows, 2);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn blank_secondary_key_disables_lookup() {
        let c = PipelineConfig::builder()
            .secondary_key(Some("  ".into()))
            .build()
            .unwrap();
        assert!(c.secondary_key.is_none());
    }

    #[test]
    fn missing_tokenizer_file_is_rejected() {
        let err = PipelineConfig::builder()
            .tokenizer_path("/definitely/not/here/tokenizer.json")
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_password() {
        let c = PipelineConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
    }
}
