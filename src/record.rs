//! Data model shared by every pipeline stage.
//!
//! Three families of types live here:
//!
//! * price data: [`PriceEntry`] and the merged, read-only [`PriceMap`];
//! * transient extraction data: [`RawRow`] and [`ExtractionResult`], created
//!   and consumed inside one document's pass;
//! * the canonical [`ProductRecord`] handed to the feed sink, plus the
//!   [`DocumentOutcome`] / [`BatchReport`] summaries returned to callers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Price data ───────────────────────────────────────────────────────────

/// One parsed price-list line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub key: String,
    pub price: Decimal,
}

/// Merged key → price mapping. Keys are unique.
///
/// Built once per run by [`crate::pricelist`], then shared read-only
/// (behind an `Arc`) by every document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceMap {
    entries: BTreeMap<String, Decimal>,
}

impl PriceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-match lookup.
    pub fn get(&self, key: &str) -> Option<Decimal> {
        self.entries.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub(crate) fn insert(&mut self, entry: PriceEntry) -> Option<Decimal> {
        self.entries.insert(entry.key, entry.price)
    }
}

impl FromIterator<PriceEntry> for PriceMap {
    /// Later entries replace earlier ones. Use
    /// [`crate::pricelist::merge_price_entries`] when the policy matters.
    fn from_iter<T: IntoIterator<Item = PriceEntry>>(iter: T) -> Self {
        let mut map = PriceMap::new();
        for entry in iter {
            map.insert(entry);
        }
        map
    }
}

// ── Extraction data ──────────────────────────────────────────────────────

/// Which extraction stage produced a set of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Table,
    Heuristic,
    Semantic,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionMethod::Table => "table",
            ExtractionMethod::Heuristic => "heuristic",
            ExtractionMethod::Semantic => "semantic",
        };
        f.write_str(s)
    }
}

/// One row of string cells as found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub cells: Vec<String>,
    pub method: ExtractionMethod,
    /// Name of the catalog document the row came from.
    pub source: String,
}

/// Rows in the native shape of the stage that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedRows {
    /// Positional cells plus column labels (detected or synthesized).
    Tabular {
        columns: Vec<String>,
        rows: Vec<RawRow>,
    },
    /// Schema-conformant objects returned by the language model.
    Structured {
        source: String,
        objects: Vec<serde_json::Map<String, serde_json::Value>>,
    },
}

/// Output of one successful extraction stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub method: ExtractionMethod,
    pub rows: ExtractedRows,
}

impl ExtractionResult {
    pub fn len(&self) -> usize {
        match &self.rows {
            ExtractedRows::Tabular { rows, .. } => rows.len(),
            ExtractedRows::Structured { objects, .. } => objects.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Canonical record ─────────────────────────────────────────────────────

/// The typed fields of [`ProductRecord`]. Anything else is a param.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    ItemId,
    Name,
    Description,
    Categories,
    Price,
    Weight,
    Width,
    Height,
    Thickness,
    MainImageUrl,
    AdditionalImageUrls,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 11] = [
        CanonicalField::ItemId,
        CanonicalField::Name,
        CanonicalField::Description,
        CanonicalField::Categories,
        CanonicalField::Price,
        CanonicalField::Weight,
        CanonicalField::Width,
        CanonicalField::Height,
        CanonicalField::Thickness,
        CanonicalField::MainImageUrl,
        CanonicalField::AdditionalImageUrls,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::ItemId => "item_id",
            CanonicalField::Name => "name",
            CanonicalField::Description => "description",
            CanonicalField::Categories => "categories",
            CanonicalField::Price => "price",
            CanonicalField::Weight => "weight",
            CanonicalField::Width => "width",
            CanonicalField::Height => "height",
            CanonicalField::Thickness => "thickness",
            CanonicalField::MainImageUrl => "main_image_url",
            CanonicalField::AdditionalImageUrls => "additional_image_urls",
        }
    }

    /// Exact canonical name match (case-insensitive, trimmed).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(name))
    }

    /// Fields holding a decimal value.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            CanonicalField::Price
                | CanonicalField::Weight
                | CanonicalField::Width
                | CanonicalField::Height
                | CanonicalField::Thickness
        )
    }
}

/// Open parameter bag for fields outside the canonical set.
///
/// Keys are unique and never equal to a canonical field name. Iteration is
/// in key order so serialised output is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a param. Returns `false` (and stores nothing) when the key is
    /// empty, names a canonical field, or is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into().trim().to_string();
        if key.is_empty() || CanonicalField::from_name(&key).is_some() || self.0.contains_key(&key)
        {
            return false;
        }
        self.0.insert(key, value.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The canonical product shape handed to the feed sink.
///
/// Only [`crate::pipeline::normalize`] constructs records; the reconciler
/// consumes one and returns a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub item_id: String,
    pub name: String,
    pub description: String,
    pub categories: String,
    pub price: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub width: Option<Decimal>,
    pub height: Option<Decimal>,
    pub thickness: Option<Decimal>,
    pub main_image_url: Option<String>,
    pub additional_image_urls: Vec<String>,
    pub params: Params,
}

// ── Reports ──────────────────────────────────────────────────────────────

/// Summary of price-list parsing for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceListReport {
    /// Number of sources parsed.
    pub sources: usize,
    /// Entries parsed across all sources, before merging.
    pub parsed_entries: usize,
    /// Matched lines dropped because the amount did not parse.
    pub malformed_lines: usize,
    /// Keys seen more than once across sources.
    pub duplicate_keys: usize,
    /// Keys in the merged map.
    pub merged_entries: usize,
}

/// What happened to one catalog document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub document: String,
    /// Stages attempted, in order.
    pub attempts: Vec<ExtractionMethod>,
    /// The stage whose rows were used, if any succeeded.
    pub method: Option<ExtractionMethod>,
    /// Records handed on for this document.
    pub records: usize,
    /// Rows dropped for an empty item_id.
    pub rejected: usize,
    /// Rows dropped for repeating an item_id already seen in the document.
    pub duplicates: usize,
    /// Records whose price came from the price map.
    pub priced_from_map: usize,
    /// Semantic chunks sent.
    pub chunks: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    /// Fatal error message, when the document failed.
    pub error: Option<String>,
}

impl DocumentOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub prices: PriceListReport,
    pub documents: Vec<DocumentOutcome>,
    /// Records actually handed to the sink.
    pub committed_records: usize,
    pub total_duration_ms: u64,
}

impl BatchReport {
    pub fn failed_documents(&self) -> usize {
        self.documents.iter().filter(|d| !d.succeeded()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_reject_canonical_names() {
        let mut p = Params::new();
        assert!(!p.insert("price", "10"));
        assert!(!p.insert(" Item_ID ", "x"));
        assert!(p.insert("colour", "white"));
        assert!(!p.insert("colour", "black"), "keys stay unique");
        assert_eq!(p.get("colour"), Some("white"));
        assert!(!p.insert("   ", "blank"));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn params_iterate_in_key_order() {
        let mut p = Params::new();
        p.insert("surface", "matt");
        p.insert("colour", "grey");
        let keys: Vec<&str> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["colour", "surface"]);
    }

    #[test]
    fn canonical_field_round_trip_names() {
        for f in CanonicalField::ALL {
            assert_eq!(CanonicalField::from_name(f.as_str()), Some(f));
        }
        assert_eq!(CanonicalField::from_name("colour"), None);
    }

    #[test]
    fn extraction_result_emptiness() {
        let r = ExtractionResult {
            method: ExtractionMethod::Table,
            rows: ExtractedRows::Tabular {
                columns: vec!["Code".into()],
                rows: vec![],
            },
        };
        assert!(r.is_empty());
    }

    #[test]
    fn method_display() {
        assert_eq!(ExtractionMethod::Heuristic.to_string(), "heuristic");
    }
}
