//! Whitespace-run row splitting for catalogs without a detectable table.
//!
//! Printed catalogs usually separate columns with wide gaps even when pdfium
//! reports no consistent grid. Splitting each text line on runs of two or
//! more whitespace characters recovers those cells.
//!
//! * candidate row: at least two tokens and a digit in the first token
//!   (product codes and sizes start rows; prose does not);
//! * header candidate: at least two tokens and no digit anywhere.
//!
//! The header is the last header candidate seen before the first candidate
//! row. Header lines can never be rows, so a header repeated on every page
//! is ignored rather than emitted as data.

use crate::error::StageError;
use crate::record::{ExtractedRows, ExtractionMethod, ExtractionResult, RawRow};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_CELL_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Split a line on runs of two or more whitespace characters.
pub fn split_cells(line: &str) -> Vec<String> {
    RE_CELL_GAP
        .split(line.trim())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_candidate_row(tokens: &[String]) -> bool {
    tokens.len() >= 2
        && tokens
            .first()
            .map(|t| t.chars().any(|c| c.is_ascii_digit()))
            .unwrap_or(false)
}

fn is_header_candidate(tokens: &[String]) -> bool {
    tokens.len() >= 2 && tokens.iter().all(|t| !t.chars().any(|c| c.is_ascii_digit()))
}

/// Positional column names `col0`, `col1`, …
pub fn positional_columns(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("col{i}")).collect()
}

/// Run the heuristic stage over the concatenated page text.
///
/// # Errors
/// [`StageError::NoRowsFound`] when no line qualifies as a candidate row.
pub fn extract_lines(text: &str, source: &str) -> Result<ExtractionResult, StageError> {
    let mut header: Option<Vec<String>> = None;
    let mut rows: Vec<RawRow> = Vec::new();

    for line in text.lines() {
        let tokens = split_cells(line);
        if is_candidate_row(&tokens) {
            rows.push(RawRow {
                cells: tokens,
                method: ExtractionMethod::Heuristic,
                source: source.to_string(),
            });
        } else if rows.is_empty() && is_header_candidate(&tokens) {
            header = Some(tokens);
        }
    }

    if rows.is_empty() {
        return Err(StageError::NoRowsFound);
    }

    let widest = rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
    let mut columns = match header {
        Some(h) => h,
        None => {
            debug!("'{}': no header line, synthesizing positional columns", source);
            Vec::new()
        }
    };
    // Cells beyond the header get positional names.
    let named = columns.len();
    columns.extend(positional_columns(widest).into_iter().skip(named));

    debug!(
        "'{}': heuristic stage found {} rows, {} columns",
        source,
        rows.len(),
        columns.len()
    );

    Ok(ExtractionResult {
        method: ExtractionMethod::Heuristic,
        rows: ExtractedRows::Tabular { columns, rows },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tabular(result: ExtractionResult) -> (Vec<String>, Vec<RawRow>) {
        match result.rows {
            ExtractedRows::Tabular { columns, rows } => (columns, rows),
            other => panic!("expected tabular rows, got {other:?}"),
        }
    }

    #[test]
    fn splits_on_whitespace_runs() {
        assert_eq!(
            split_cells("  60x60 - Rettificato    Bianco\t\t12,25 "),
            vec!["60x60 - Rettificato", "Bianco", "12,25"]
        );
    }

    #[test]
    fn uses_header_before_first_row() {
        let text = "Collezione Marmi\nCodice   Nome    Prezzo\nM100   Calacatta   45,00\nM200   Statuario   52,00";
        let (columns, rows) = tabular(extract_lines(text, "marmi.pdf").unwrap());
        assert_eq!(columns, vec!["Codice", "Nome", "Prezzo"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cells, vec!["M200", "Statuario", "52,00"]);
        assert_eq!(rows[0].source, "marmi.pdf");
    }

    #[test]
    fn synthesizes_positional_columns_without_header() {
        let text = "60x60   Grey   12,25\n30x60   White";
        let (columns, rows) = tabular(extract_lines(text, "x").unwrap());
        assert_eq!(columns, vec!["col0", "col1", "col2"]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn repeated_page_headers_are_not_rows() {
        let text = "Code   Name\nA1   Tile X\nCode   Name\nB2   Tile Y";
        let (columns, rows) = tabular(extract_lines(text, "x").unwrap());
        assert_eq!(columns, vec!["Code", "Name"]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn extra_cells_get_positional_names() {
        let text = "Code   Name\nA1   Tile X   R10";
        let (columns, _) = tabular(extract_lines(text, "x").unwrap());
        assert_eq!(columns, vec!["Code", "Name", "col2"]);
    }

    #[test]
    fn prose_only_yields_no_rows() {
        let text = "Our collections are made in Italy.\nContact   Sales team";
        assert_eq!(extract_lines(text, "x").unwrap_err(), StageError::NoRowsFound);
    }

    #[test]
    fn positional_names() {
        assert_eq!(positional_columns(2), vec!["col0", "col1"]);
    }
}
