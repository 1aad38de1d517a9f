//! Text layout extraction: PDF bytes → positioned text lines via pdfium.
//!
//! Both deterministic stages work from the same [`DocumentLayout`]: the
//! table detector uses span x-positions to find aligned columns, the
//! heuristic splitter and the semantic stage use the plain page text.
//!
//! pdfium is not async-safe, so [`read_layout`] runs the reader inside
//! `spawn_blocking`. The reader sits behind the [`LayoutReader`] trait so the
//! rest of the pipeline can be driven from hand-built layouts.

use crate::error::CatalogError;
use crate::pipeline::input::CatalogDocument;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Vertical distance (points) within which two segments share a line.
const LINE_TOLERANCE: f32 = 2.5;

/// Horizontal gap (points) below which neighbouring segments are one cell.
const CELL_GAP: f32 = 3.0;

/// Approximate glyph advance used for monospace text layouts.
const MONOSPACE_ADVANCE: f32 = 6.0;

/// A run of text at a horizontal position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub x: f32,
    pub x_end: f32,
    pub text: String,
}

/// Spans sharing a baseline, left to right.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLine {
    pub spans: Vec<TextSpan>,
}

impl TextLine {
    pub fn cells(&self) -> Vec<String> {
        self.spans.iter().map(|s| s.text.clone()).collect()
    }
}

/// One page: positioned lines (top to bottom) plus its plain text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub lines: Vec<TextLine>,
    pub text: String,
}

impl PageLayout {
    /// Build a layout from already-extracted text, treating it as monospace:
    /// runs of two or more spaces separate spans and each character advances
    /// a fixed width.
    pub fn from_monospace_text(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| TextLine {
                spans: monospace_spans(line),
            })
            .filter(|l| !l.spans.is_empty())
            .collect();
        Self {
            lines,
            text: text.to_string(),
        }
    }
}

fn monospace_spans(line: &str) -> Vec<TextSpan> {
    let chars: Vec<char> = line.chars().collect();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        // A span ends at a run of two whitespace characters or end of line.
        while i < chars.len() {
            let gap = chars[i].is_whitespace()
                && chars.get(i + 1).map(|c| c.is_whitespace()).unwrap_or(true);
            if gap {
                break;
            }
            i += 1;
        }
        let text: String = chars[start..i].iter().collect::<String>().trim().to_string();
        spans.push(TextSpan {
            x: start as f32 * MONOSPACE_ADVANCE,
            x_end: i as f32 * MONOSPACE_ADVANCE,
            text,
        });
    }
    spans
}

/// All pages of one catalog in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentLayout {
    pub pages: Vec<PageLayout>,
}

impl DocumentLayout {
    /// Page texts concatenated in page order.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.trim_end())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// Produces a [`DocumentLayout`] from catalog bytes.
pub trait LayoutReader: Send + Sync {
    fn read(
        &self,
        document: &CatalogDocument,
        password: Option<&str>,
    ) -> Result<DocumentLayout, CatalogError>;
}

/// Read a layout on the blocking thread pool.
pub async fn read_layout(
    reader: Arc<dyn LayoutReader>,
    document: &CatalogDocument,
    password: Option<&str>,
) -> Result<DocumentLayout, CatalogError> {
    let doc = document.clone();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || reader.read(&doc, pwd.as_deref()))
        .await
        .map_err(|e| CatalogError::Internal(format!("Layout task panicked: {}", e)))?
}

/// [`LayoutReader`] backed by the pdfium library.
///
/// The library is located through `PDFIUM_LIB_PATH` (file or directory),
/// then the working directory, then the system library path.
#[derive(Debug, Default, Clone)]
pub struct PdfiumLayoutReader;

impl LayoutReader for PdfiumLayoutReader {
    fn read(
        &self,
        document: &CatalogDocument,
        password: Option<&str>,
    ) -> Result<DocumentLayout, CatalogError> {
        let pdfium = bind_pdfium()?;
        let name = document.name.as_str();

        let pdf = pdfium
            .load_pdf_from_byte_slice(&document.bytes, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        CatalogError::WrongPassword { name: name.to_string() }
                    } else {
                        CatalogError::PasswordRequired { name: name.to_string() }
                    }
                } else {
                    CatalogError::CorruptPdf {
                        name: name.to_string(),
                        detail: err_str,
                    }
                }
            })?;

        let mut pages = Vec::new();
        for (idx, page) in pdf.pages().iter().enumerate() {
            match page_layout(&page) {
                Ok(layout) => {
                    debug!(
                        "Page {} of '{}': {} lines",
                        idx + 1,
                        name,
                        layout.lines.len()
                    );
                    pages.push(layout);
                }
                Err(e) => {
                    warn!("Page {} of '{}' has no text layer: {:?}", idx + 1, name, e);
                    pages.push(PageLayout::default());
                }
            }
        }

        info!("Read layout of '{}': {} pages", name, pages.len());
        Ok(DocumentLayout { pages })
    }
}

fn bind_pdfium() -> Result<Pdfium, CatalogError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => {
            let path = PathBuf::from(path);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(lib)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| CatalogError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

#[allow(deprecated)]
fn page_layout(page: &PdfPage) -> Result<PageLayout, PdfiumError> {
    let text = page.text()?;
    let mut positioned = Vec::new();

    for segment in text.segments().iter() {
        let content = segment.text();
        if content.trim().is_empty() {
            continue;
        }
        let bounds = segment.bounds();
        positioned.push(PositionedText {
            top: bounds.top.value,
            left: bounds.left.value,
            right: bounds.right.value,
            text: content.trim().to_string(),
        });
    }

    Ok(PageLayout {
        lines: group_lines(positioned),
        text: text.all(),
    })
}

/// A text segment in PDF coordinates (y grows upwards).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PositionedText {
    pub top: f32,
    pub left: f32,
    pub right: f32,
    pub text: String,
}

/// Group segments into lines (top of page first), ordering spans left to
/// right and merging segments that touch into one cell.
pub(crate) fn group_lines(mut segments: Vec<PositionedText>) -> Vec<TextLine> {
    segments.sort_by(|a, b| b.top.total_cmp(&a.top).then(a.left.total_cmp(&b.left)));

    let mut rows: Vec<(f32, Vec<PositionedText>)> = Vec::new();
    for seg in segments {
        match rows.last_mut() {
            Some((top, members)) if (*top - seg.top).abs() <= LINE_TOLERANCE => members.push(seg),
            _ => rows.push((seg.top, vec![seg])),
        }
    }

    rows.into_iter()
        .map(|(_, mut members)| {
            members.sort_by(|a, b| a.left.total_cmp(&b.left));
            let mut spans: Vec<TextSpan> = Vec::new();
            for m in members {
                match spans.last_mut() {
                    Some(prev) if m.left - prev.x_end < CELL_GAP => {
                        prev.text.push(' ');
                        prev.text.push_str(&m.text);
                        prev.x_end = prev.x_end.max(m.right);
                    }
                    _ => spans.push(TextSpan {
                        x: m.left,
                        x_end: m.right,
                        text: m.text,
                    }),
                }
            }
            TextLine { spans }
        })
        .collect()
}
