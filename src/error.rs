//! Error types for the catalog-feed library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`CatalogError`]: **Fatal**: the run (or one catalog document) cannot
//!   proceed. Missing inputs, unreadable PDFs and a semantic reply that
//!   cannot be parsed all land here. Document-level fatals are stored in
//!   [`crate::record::DocumentOutcome`] so one bad catalog does not hide the
//!   results of the others.
//!
//! * [`StageError`]: **Soft**: an extraction stage found nothing. These
//!   never reach the caller; they are the transition triggers of the
//!   extraction state machine in [`crate::run`].
//!
//! * [`PriceLineError`]: **Soft**: one price-list line matched the
//!   key/amount/currency pattern but the amount did not parse. The line is
//!   logged and dropped.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the catalog-feed library.
#[derive(Debug, Error)]
pub enum CatalogError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A required input was not supplied at all.
    #[error("Missing required input: {what}\nA run needs at least one catalog, one price list and a destination schema.")]
    MissingRequiredInput { what: String },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The catalog was read, but is not a PDF.
    #[error("Catalog '{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    /// A spreadsheet price list could not be opened.
    #[error("Price list '{name}' could not be read as a spreadsheet: {detail}")]
    UnreadablePriceList { name: String, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Catalog '{name}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("Catalog '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for catalog '{name}'")]
    WrongPassword { name: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform and either place it on the system\n\
library path or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Table and heuristic stages found nothing and semantic extraction is
    /// disabled or has no provider.
    #[error("No product rows found in '{document}': {reason}")]
    NoRowsFound { document: String, reason: String },

    /// A semantic chunk reply could not be parsed as a JSON array, or the
    /// completion call failed. Never retried.
    #[error(
        "Semantic extraction failed for '{document}' (chunk {chunk}): {detail}\n\
Raw model reply follows; correct it manually and re-run.\n{raw_reply}"
    )]
    SemanticExtractionFailed {
        document: String,
        chunk: usize,
        detail: String,
        raw_reply: String,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The feed sink could not persist records.
    #[error("Failed to write feed output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Records could not be serialised for the sink.
    #[error("Failed to serialise feed records: {0}")]
    Serialisation(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Soft outcome of a single extraction stage. Drives the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The table detector found no tabular region.
    #[error("no table found")]
    NoTableFound,

    /// The heuristic splitter found no candidate rows.
    #[error("no candidate rows found")]
    NoRowsFound,
}

/// A price-list line that matched the pattern but could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceLineError {
    #[error("line {line}: amount '{amount}' is not a number")]
    Malformed { line: usize, amount: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_display() {
        let e = CatalogError::MissingRequiredInput {
            what: "price list".into(),
        };
        assert!(e.to_string().contains("price list"));
    }

    #[test]
    fn semantic_failure_surfaces_raw_reply() {
        let e = CatalogError::SemanticExtractionFailed {
            document: "tiles.pdf".into(),
            chunk: 3,
            detail: "no JSON array".into(),
            raw_reply: "Sorry, I cannot help".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("chunk 3"), "got: {msg}");
        assert!(msg.contains("Sorry, I cannot help"), "got: {msg}");
    }

    #[test]
    fn price_line_display() {
        let e = PriceLineError::Malformed {
            line: 7,
            amount: "abc".into(),
        };
        assert_eq!(e.to_string(), "line 7: amount 'abc' is not a number");
    }

    #[test]
    fn stage_errors_are_comparable() {
        assert_ne!(StageError::NoTableFound, StageError::NoRowsFound);
    }
}
