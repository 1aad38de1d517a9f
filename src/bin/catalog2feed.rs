//! CLI binary for catalog-feed.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use catalog_feed::{
    build_price_map, CatalogPipeline, CommitPolicy, DuplicateKeyPolicy, ExtractionMethod,
    FeedSchema, FeedSink, JsonFeedSink, MemorySink, PipelineConfig, PipelineProgressCallback,
    ProgressCallback, RunInputs,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over catalogs, one log line per
/// finished catalog.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading price lists…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, document: &str) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(document)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_documents: usize, price_entries: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} catalogs  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_documents as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{price_entries} prices loaded; processing {total_documents} catalogs…"
            ))
        ));
    }

    fn on_document_start(&self, document: &str, _index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(document.to_string(), Instant::now());
        self.bar.set_message(document.to_string());
    }

    fn on_stage_attempt(&self, document: &str, stage: ExtractionMethod) {
        self.bar.set_message(format!("{document}: {stage}"));
    }

    fn on_chunk_start(&self, document: &str, chunk: usize, total_chunks: usize) {
        self.bar
            .set_message(format!("{document}: semantic chunk {chunk}/{total_chunks}"));
    }

    fn on_document_complete(&self, document: &str, records: usize, rejected: usize) {
        let secs = self.elapsed_secs(document);
        self.bar.println(format!(
            "  {} {:<32} {:<16} {}",
            green("✓"),
            document,
            dim(&format!("{records:>5} records")),
            dim(&format!("{rejected} rejected  {secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, document: &str, error: &str) {
        let secs = self.elapsed_secs(document);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // First line only; the full message is printed after the run.
        let first = error.lines().next().unwrap_or(error);
        let msg = if first.chars().count() > 80 {
            format!("{}\u{2026}", first.chars().take(79).collect::<String>())
        } else {
            first.to_string()
        };

        self.bar.println(format!(
            "  {} {:<32} {}  {}",
            red("✗"),
            document,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_documents: usize, committed_records: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);

        if failed == 0 {
            eprintln!(
                "{} {} catalogs processed, {} records committed",
                green("✔"),
                bold(&total_documents.to_string()),
                bold(&committed_records.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} catalogs processed  ({} failed), {} records committed",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&(total_documents - failed).to_string()),
                total_documents,
                red(&failed.to_string()),
                committed_records,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One catalog, one price list, feed to a file
  catalog2feed catalog.pdf -p cenik.txt -o feed.json

  # Several catalogs and price lists, nothing committed unless all succeed
  catalog2feed a.pdf b.pdf -p cenik.txt -p cenik-2024.xlsx --commit all-or-nothing -o feed.json

  # Deterministic stages only (no API key needed)
  catalog2feed --no-semantic catalog.pdf -p cenik.txt

  # Check how price lists parse
  catalog2feed --inspect-prices -p cenik.txt -p cenik.xlsx

  # Exact chunk sizes with the model's tokenizer
  catalog2feed --tokenizer tokenizer.json --chunk-tokens 1200 catalog.pdf -p cenik.txt

  # JSON run report on stdout
  catalog2feed --json catalog.pdf -p cenik.txt -o feed.json > report.json

EXTRACTION STAGES (tried in order, first one with rows wins):
  table      aligned column grid detected from text positions
  heuristic  lines split on runs of 2+ spaces, rows start with a code
  semantic   text sent to the LLM in token-bounded chunks

PRICE LISTS:
  Text lines of the form   <key>   <amount> <€|EUR|Kč|CZK|$|USD>
  e.g.                     60x60 - Rettificato    12,25 €
  Spreadsheets (xlsx, xls, ods): first column key, second column price.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Extract product records from PDF catalogs and price lists.
#[derive(Parser, Debug)]
#[command(
    name = "catalog2feed",
    version,
    about = "Extract product records from PDF catalogs and price lists into a shop feed",
    long_about = "Extract product records from supplier PDF catalogs (local files or URLs), \
match them against one or more price lists, and write a shop feed. Table detection and \
whitespace heuristics run first; an LLM is used only when both find nothing.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Catalog PDF paths or HTTP/HTTPS URLs.
    catalogs: Vec<String>,

    /// Price list path or URL (repeatable; text or spreadsheet).
    #[arg(short, long = "prices", env = "CATALOG_FEED_PRICES")]
    prices: Vec<String>,

    /// Write the feed (JSON) to this file instead of stdout.
    #[arg(short, long, env = "CATALOG_FEED_OUTPUT")]
    output: Option<PathBuf>,

    /// Destination feed schema.
    #[arg(long, env = "CATALOG_FEED_SCHEMA", default_value = "heureka")]
    schema: String,

    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Never call the LLM; catalogs without table or heuristic rows fail.
    #[arg(long, env = "CATALOG_FEED_NO_SEMANTIC")]
    no_semantic: bool,

    /// Token budget per semantic chunk (100–32000).
    #[arg(long, env = "CATALOG_FEED_CHUNK_TOKENS", default_value_t = 1500)]
    chunk_tokens: usize,

    /// HuggingFace tokenizer.json for exact token counts.
    #[arg(long, env = "CATALOG_FEED_TOKENIZER")]
    tokenizer: Option<PathBuf>,

    /// Decimal places prices are rounded to (0–6).
    #[arg(long, env = "CATALOG_FEED_PRECISION", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(0..=6))]
    precision: u32,

    /// Which price wins when a key repeats.
    #[arg(long, env = "CATALOG_FEED_DUPLICATE_KEYS", value_enum, default_value = "first")]
    duplicate_keys: DuplicateKeysArg,

    /// Param used as the fallback price key ("none" disables it).
    #[arg(long, env = "CATALOG_FEED_SECONDARY_KEY", default_value = "size")]
    secondary_key: String,

    /// When records reach the feed.
    #[arg(long, env = "CATALOG_FEED_COMMIT", value_enum, default_value = "per-document")]
    commit: CommitArg,

    /// PDF user password for encrypted catalogs.
    #[arg(long, env = "CATALOG_FEED_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "CATALOG_FEED_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per chunk.
    #[arg(long, env = "CATALOG_FEED_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "CATALOG_FEED_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "CATALOG_FEED_JSON")]
    json: bool,

    /// Parse price lists only and print the merged map.
    #[arg(long)]
    inspect_prices: bool,

    /// Disable progress bar.
    #[arg(long, env = "CATALOG_FEED_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CATALOG_FEED_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CATALOG_FEED_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "CATALOG_FEED_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum DuplicateKeysArg {
    First,
    Last,
}

impl From<DuplicateKeysArg> for DuplicateKeyPolicy {
    fn from(v: DuplicateKeysArg) -> Self {
        match v {
            DuplicateKeysArg::First => DuplicateKeyPolicy::FirstWins,
            DuplicateKeysArg::Last => DuplicateKeyPolicy::LastWins,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CommitArg {
    PerDocument,
    AllOrNothing,
}

impl From<CommitArg> for CommitPolicy {
    fn from(v: CommitArg) -> Self {
        match v {
            CommitArg::PerDocument => CommitPolicy::PerDocument,
            CommitArg::AllOrNothing => CommitPolicy::AllOrNothing,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_prices;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let schema = FeedSchema::by_name(&cli.schema)
        .with_context(|| format!("Unknown feed schema '{}' (available: heureka)", cli.schema))?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Load inputs ──────────────────────────────────────────────────────
    let catalogs = if cli.inspect_prices { Vec::new() } else { cli.catalogs.clone() };
    let inputs = RunInputs::load(&catalogs, &cli.prices, Some(schema), cli.download_timeout)
        .await
        .context("Failed to load price lists")?;

    // ── Inspect-prices mode ──────────────────────────────────────────────
    if cli.inspect_prices {
        let (map, report) = build_price_map(&inputs.price_sources, config.duplicate_keys)
            .context("Failed to parse price lists")?;

        if cli.json {
            let out = serde_json::json!({ "report": report, "prices": map });
            println!(
                "{}",
                serde_json::to_string_pretty(&out).context("Failed to serialise prices")?
            );
        } else {
            for (key, price) in map.iter() {
                println!("{key:<48} {price}");
            }
            eprintln!(
                "{} keys from {} sources  ({} parsed, {} duplicates, {} malformed lines)",
                report.merged_entries,
                report.sources,
                report.parsed_entries,
                report.duplicate_keys,
                report.malformed_lines
            );
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let pipeline = CatalogPipeline::new(config).context("Failed to set up pipeline")?;

    let mut file_sink = cli.output.as_ref().map(JsonFeedSink::new);
    let mut memory_sink = MemorySink::new();
    let sink: &mut dyn FeedSink = match file_sink.as_mut() {
        Some(s) => s,
        None => &mut memory_sink,
    };

    let report = pipeline.run(&inputs, sink).await.context("Extraction failed")?;

    // Full error text (semantic failures carry the raw model reply).
    for doc in report.documents.iter().filter(|d| !d.succeeded()) {
        if let Some(ref e) = doc.error {
            eprintln!("{} {}\n{}\n", red("✗"), bold(&doc.document), e);
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if cli.output.is_none() {
        let records = memory_sink.records();
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialise records")?
        );
    }

    if !cli.quiet && !show_progress {
        let tokens_in: u64 = report.documents.iter().map(|d| d.input_tokens).sum();
        let tokens_out: u64 = report.documents.iter().map(|d| d.output_tokens).sum();
        eprintln!(
            "Processed {} catalogs ({} failed), {} records committed in {}ms",
            report.documents.len(),
            report.failed_documents(),
            report.committed_records,
            report.total_duration_ms
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&tokens_in.to_string()),
            dim(&tokens_out.to_string()),
        );
    }

    if report.failed_documents() > 0 {
        anyhow::bail!(
            "{} of {} catalogs failed",
            report.failed_documents(),
            report.documents.len()
        );
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .semantic_enabled(!cli.no_semantic)
        .chunk_token_budget(cli.chunk_tokens)
        .price_precision(cli.precision)
        .duplicate_keys(cli.duplicate_keys.clone().into())
        .commit_policy(cli.commit.clone().into())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout);

    let secondary = match cli.secondary_key.trim() {
        k if k.eq_ignore_ascii_case("none") => None,
        k => Some(k.to_string()),
    };
    builder = builder.secondary_key(secondary);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref path) = cli.tokenizer {
        builder = builder.tokenizer_path(path);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_paths_keep_their_commas() {
        let cli = Cli::try_parse_from([
            "catalog2feed",
            "catalog.pdf",
            "-p",
            "ceník,2024.txt",
            "--prices",
            "https://example.com/prices?a=1,2",
        ])
        .unwrap();
        assert_eq!(
            cli.prices,
            vec!["ceník,2024.txt", "https://example.com/prices?a=1,2"]
        );
    }
}
