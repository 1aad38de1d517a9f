//! Input resolution: turn user-supplied paths or URLs into in-memory inputs.
//!
//! Catalogs are loaded as bytes and checked for the `%PDF` magic before any
//! extraction stage sees them, so callers get a meaningful error rather than
//! a pdfium failure. Price lists are classified by extension: spreadsheets
//! go to `calamine`, everything else is read as text.

use crate::error::CatalogError;
use crate::pricelist::PriceSource;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A catalog document ready for extraction.
#[derive(Debug, Clone)]
pub struct CatalogDocument {
    /// Display name (file name or last URL segment).
    pub name: String,
    pub bytes: Vec<u8>,
}

impl CatalogDocument {
    /// Wrap in-memory bytes, validating the PDF magic.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, CatalogError> {
        let name = name.into();
        check_pdf_magic(&name, &bytes)?;
        Ok(Self { name, bytes })
    }
}

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a catalog from a local path or URL.
pub async fn load_catalog(input: &str, timeout_secs: u64) -> Result<CatalogDocument, CatalogError> {
    let (name, bytes) = fetch(input, timeout_secs).await?;
    CatalogDocument::from_bytes(name, bytes)
}

/// Load a price list from a local path or URL.
pub async fn load_price_source(input: &str, timeout_secs: u64) -> Result<PriceSource, CatalogError> {
    let (name, bytes) = fetch(input, timeout_secs).await?;
    if is_spreadsheet(&name) {
        Ok(PriceSource::Spreadsheet { name, bytes })
    } else {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(PriceSource::Text { name, text })
    }
}

fn is_spreadsheet(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), CatalogError> {
    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(CatalogError::NotAPdf {
            name: name.to_string(),
            magic,
        });
    }
    if bytes.len() < 4 {
        return Err(CatalogError::CorruptPdf {
            name: name.to_string(),
            detail: format!("only {} bytes", bytes.len()),
        });
    }
    Ok(())
}

async fn fetch(input: &str, timeout_secs: u64) -> Result<(String, Vec<u8>), CatalogError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<(String, Vec<u8>), CatalogError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => CatalogError::PermissionDenied { path: path.clone() },
        _ => CatalogError::FileNotFound { path: path.clone() },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());
    debug!("Read local input '{}' ({} bytes)", name, bytes.len());
    Ok((name, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<(String, Vec<u8>), CatalogError> {
    info!("Downloading input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            CatalogError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            CatalogError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok((filename_from_url(url), bytes.to_vec()))
}

/// Last non-empty URL path segment, or `download`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "download".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/catalog.pdf"));
        assert!(is_url("http://example.com/cenik.txt"));
        assert!(!is_url("/tmp/catalog.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_comes_from_last_segment() {
        assert_eq!(
            filename_from_url("https://shop.example/files/cenik.xlsx"),
            "cenik.xlsx"
        );
        assert_eq!(filename_from_url("https://shop.example/"), "download");
    }

    #[test]
    fn spreadsheet_detection_by_extension() {
        assert!(is_spreadsheet("cenik.XLSX"));
        assert!(is_spreadsheet("prices.ods"));
        assert!(!is_spreadsheet("cenik.txt"));
        assert!(!is_spreadsheet("cenik"));
    }

    #[test]
    fn non_pdf_bytes_are_rejected() {
        let err = CatalogDocument::from_bytes("x.pdf", b"PK\x03\x04rest".to_vec()).unwrap_err();
        assert!(matches!(err, CatalogError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = load_catalog("/definitely/not/a/real/catalog.pdf", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn text_price_list_loads_from_disk() {
        let mut tmp = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(tmp, "A1   10,00 €").unwrap();
        let source = load_price_source(tmp.path().to_str().unwrap(), 5)
            .await
            .unwrap();
        match source {
            PriceSource::Text { text, .. } => assert!(text.contains("A1")),
            other => panic!("expected text source, got {other:?}"),
        }
    }
}
