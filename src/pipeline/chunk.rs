//! Token-bounded text chunking for the semantic stage.
//!
//! Each chunk must fit the model's context together with the schema, the
//! price map and the reply, so chunks are bounded by a token budget rather
//! than a character count. Counting uses the model's own tokenizer when a
//! `tokenizer.json` is configured; otherwise a conservative estimate.
//!
//! Chunks break on line boundaries so a catalog row is never split across
//! two requests; only a single line longer than the budget is cut, at word
//! boundaries.

use crate::error::CatalogError;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::debug;

/// Counts tokens the way the target model does.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Estimate of roughly four characters per token.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Exact counts from a HuggingFace tokenizer file.
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            CatalogError::InvalidConfig(format!(
                "cannot load tokenizer '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(_) => ApproxTokenCounter.count(text),
        }
    }
}

/// Build the counter for a config: exact when a tokenizer file is set.
pub fn token_counter(path: Option<&Path>) -> Result<Box<dyn TokenCounter>, CatalogError> {
    match path {
        Some(p) => Ok(Box::new(HfTokenCounter::from_file(p)?)),
        None => Ok(Box::new(ApproxTokenCounter)),
    }
}

/// Split `text` into chunks of at most `budget` tokens each.
pub fn chunk_text(text: &str, budget: usize, counter: &dyn TokenCounter) -> Vec<String> {
    let budget = budget.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let line_tokens = counter.count(line);

        if line_tokens > budget {
            flush(&mut chunks, &mut current, &mut current_tokens);
            chunks.extend(split_long_line(line, budget, counter));
            continue;
        }

        // +1 for the newline joining lines.
        if !current.is_empty() && current_tokens + line_tokens + 1 > budget {
            flush(&mut chunks, &mut current, &mut current_tokens);
        }
        current_tokens += line_tokens + usize::from(!current.is_empty());
        current.push(line);
    }
    flush(&mut chunks, &mut current, &mut current_tokens);

    debug!("Chunked {} chars into {} chunks", text.len(), chunks.len());
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut Vec<&str>, tokens: &mut usize) {
    if !current.is_empty() {
        chunks.push(current.join("\n"));
        current.clear();
    }
    *tokens = 0;
}

fn split_long_line(line: &str, budget: usize, counter: &dyn TokenCounter) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();

    for word in line.split_whitespace() {
        let candidate = if piece.is_empty() {
            word.to_string()
        } else {
            format!("{piece} {word}")
        };
        if !piece.is_empty() && counter.count(&candidate) > budget {
            pieces.push(std::mem::take(&mut piece));
            piece = word.to_string();
        } else {
            piece = candidate;
        }
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace-separated word.
    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    #[test]
    fn approx_counter_rounds_up() {
        assert_eq!(ApproxTokenCounter.count(""), 0);
        assert_eq!(ApproxTokenCounter.count("abcde"), 2);
    }

    #[test]
    fn lines_are_never_split_when_they_fit() {
        let text = "a b c\nd e f\ng h i";
        let chunks = chunk_text(text, 6, &WordCounter);
        assert_eq!(chunks, vec!["a b c", "d e f", "g h i"]);

        // 3 + 3 + 1 for the newline fits exactly.
        let chunks = chunk_text(text, 7, &WordCounter);
        assert_eq!(chunks, vec!["a b c\nd e f", "g h i"]);
    }

    #[test]
    fn every_chunk_respects_the_budget() {
        let text = (0..50)
            .map(|i| format!("A{i}   Tile {i}   {i},50 €"))
            .collect::<Vec<_>>()
            .join("\n");
        for chunk in chunk_text(&text, 20, &ApproxTokenCounter) {
            assert!(ApproxTokenCounter.count(&chunk) <= 20, "chunk too big: {chunk}");
        }
    }

    #[test]
    fn oversized_line_is_cut_at_words() {
        let chunks = chunk_text("one two three four five", 2, &WordCounter);
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn blank_text_gives_no_chunks() {
        assert!(chunk_text("\n  \n", 10, &WordCounter).is_empty());
    }

    #[test]
    fn missing_tokenizer_file_is_config_error() {
        let err = token_counter(Some(Path::new("/no/such/tokenizer.json"))).err().unwrap();
        assert!(matches!(err, CatalogError::InvalidConfig(_)));
    }
}
