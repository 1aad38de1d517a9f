//! Pipeline stages for catalog-to-feed extraction.
//!
//! Each submodule implements exactly one step, so each can be tested on
//! hand-built input without pdfium or a language model.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ layout ──▶ table ──▶ heuristic ──▶ semantic ──▶ normalize ──▶ reconcile
//! (URL/path) (pdfium)   (grid)    (gaps)        (LLM)        (schema)      (prices)
//! ```
//!
//! 1. [`input`]: load catalog bytes and price sources, validate `%PDF`
//! 2. [`layout`]: positioned text lines per page; `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`table`]: aligned-column region detection
//! 4. [`heuristic`]: whitespace-run row splitting
//! 5. [`semantic`]: token-bounded [`chunk`]s sent through [`llm`], replies
//!    parsed by [`reply`]; the only stage with network I/O
//! 6. [`normalize`]: any stage's rows → canonical records
//! 7. [`reconcile`]: fill missing prices from the price map
//!
//! Stages 3–5 are alternatives tried in order; the state machine driving
//! them lives in [`crate::run`].

pub mod chunk;
pub mod heuristic;
pub mod input;
pub mod layout;
pub mod llm;
pub mod normalize;
pub mod reconcile;
pub mod reply;
pub mod semantic;
pub mod table;
