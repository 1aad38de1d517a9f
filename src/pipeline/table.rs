//! Deterministic table detection over positioned text lines.
//!
//! A tabular region is a maximal run of consecutive lines on one page that
//! all have the same number of cells (at least two) and whose cell start
//! positions line up with the first line of the run. Catalog price tables
//! print every row on the same column grid, so alignment is a strong signal
//! that survives fonts and decorations pdfium cannot interpret.
//!
//! Region choice: the region with the most rows wins; on a tie the first
//! region in detection order (page order, then top to bottom) wins.

use crate::error::StageError;
use crate::pipeline::layout::{DocumentLayout, TextLine};
use crate::record::{ExtractedRows, ExtractionMethod, ExtractionResult, RawRow};
use tracing::debug;

/// A detected tabular region.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRegion {
    /// 0-indexed page.
    pub page: usize,
    /// Index of the first line on the page.
    pub first_line: usize,
    pub rows: Vec<Vec<String>>,
}

/// Find every tabular region with at least `min_rows` rows, in detection order.
pub fn detect_regions(layout: &DocumentLayout, min_rows: usize, tolerance: f32) -> Vec<TableRegion> {
    let mut regions = Vec::new();

    for (page_idx, page) in layout.pages.iter().enumerate() {
        let mut run_start: Option<usize> = None;

        for (i, line) in page.lines.iter().enumerate() {
            let continues = match run_start {
                Some(start) => aligned(&page.lines[start], line, tolerance),
                None => false,
            };
            if continues {
                continue;
            }
            if let Some(start) = run_start.take() {
                push_region(&mut regions, page_idx, start, &page.lines[start..i], min_rows);
            }
            if line.spans.len() >= 2 {
                run_start = Some(i);
            }
        }

        if let Some(start) = run_start {
            push_region(&mut regions, page_idx, start, &page.lines[start..], min_rows);
        }
    }

    regions
}

fn push_region(
    regions: &mut Vec<TableRegion>,
    page: usize,
    first_line: usize,
    lines: &[TextLine],
    min_rows: usize,
) {
    if lines.len() < min_rows {
        return;
    }
    debug!(
        "Table region on page {} at line {}: {} rows x {} columns",
        page + 1,
        first_line,
        lines.len(),
        lines[0].spans.len()
    );
    regions.push(TableRegion {
        page,
        first_line,
        rows: lines.iter().map(TextLine::cells).collect(),
    });
}

fn aligned(anchor: &TextLine, line: &TextLine, tolerance: f32) -> bool {
    anchor.spans.len() == line.spans.len()
        && anchor
            .spans
            .iter()
            .zip(&line.spans)
            .all(|(a, b)| (a.x - b.x).abs() <= tolerance)
}

/// Pick the largest region; ties go to the earliest.
pub fn select_region(regions: Vec<TableRegion>) -> Option<TableRegion> {
    let mut best: Option<TableRegion> = None;
    for region in regions {
        let better = match &best {
            Some(b) => region.rows.len() > b.rows.len(),
            None => true,
        };
        if better {
            best = Some(region);
        }
    }
    best
}

/// Run the table stage over a document.
///
/// # Errors
/// [`StageError::NoTableFound`] when no region qualifies or the chosen
/// region has a header but no data rows.
pub fn extract_table(
    layout: &DocumentLayout,
    source: &str,
    min_rows: usize,
    tolerance: f32,
) -> Result<ExtractionResult, StageError> {
    let regions = detect_regions(layout, min_rows, tolerance);
    debug!("'{}': {} table regions detected", source, regions.len());

    let region = select_region(regions).ok_or(StageError::NoTableFound)?;
    let mut rows = region.rows.into_iter();
    let columns = rows.next().ok_or(StageError::NoTableFound)?;
    let data: Vec<RawRow> = rows
        .map(|cells| RawRow {
            cells,
            method: ExtractionMethod::Table,
            source: source.to_string(),
        })
        .collect();

    if data.is_empty() {
        return Err(StageError::NoTableFound);
    }

    Ok(ExtractionResult {
        method: ExtractionMethod::Table,
        rows: ExtractedRows::Tabular {
            columns,
            rows: data,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::PageLayout;

    fn layout(pages: &[&str]) -> DocumentLayout {
        DocumentLayout {
            pages: pages.iter().map(|p| PageLayout::from_monospace_text(p)).collect(),
        }
    }

    #[test]
    fn detects_aligned_table() {
        let doc = layout(&["Tile catalogue\nCode  Name    Price\nA1    Tile X  12.25\nB2    Tile Y  9.90\nThank you"]);
        let result = extract_table(&doc, "cat.pdf", 2, 6.0).unwrap();
        match result.rows {
            ExtractedRows::Tabular { columns, rows } => {
                assert_eq!(columns, vec!["Code", "Name", "Price"]);
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].cells, vec!["A1", "Tile X", "12.25"]);
                assert_eq!(rows[1].method, ExtractionMethod::Table);
            }
            other => panic!("unexpected rows {other:?}"),
        }
    }

    #[test]
    fn misaligned_lines_break_the_region() {
        let doc = layout(&["Code  Price\nA1  10\n   B2      20"]);
        assert!(detect_regions(&doc, 2, 1.0).is_empty());
        assert_eq!(
            extract_table(&doc, "x", 2, 1.0).unwrap_err(),
            StageError::NoTableFound
        );
    }

    #[test]
    fn largest_region_wins_and_ties_go_first() {
        let doc = layout(&[
            "K  V\n1  a\n\nFirst line only\nX  Y\n2  b",
            "P  Q  R\n1  2  3\n4  5  6",
        ]);
        let regions = detect_regions(&doc, 2, 6.0);
        assert_eq!(regions.len(), 3);
        let chosen = select_region(regions.clone()).unwrap();
        assert_eq!(chosen.page, 1);
        assert_eq!(chosen.rows.len(), 3);

        let tie = select_region(regions[..2].to_vec()).unwrap();
        assert_eq!(tie.rows[0], vec!["K", "V"]);
    }

    #[test]
    fn single_line_regions_are_ignored() {
        let doc = layout(&["Code  Name\nplain prose line"]);
        assert!(extract_table(&doc, "x", 2, 6.0).is_err());
    }

    #[test]
    fn empty_document_has_no_table() {
        assert_eq!(
            extract_table(&DocumentLayout::default(), "x", 2, 6.0).unwrap_err(),
            StageError::NoTableFound
        );
    }
}
