//! Record normalization: any stage's rows → canonical [`ProductRecord`]s.
//!
//! Tabular rows (table and heuristic stages) carry positional cells plus a
//! header; the header is resolved to canonical fields once per table through
//! a case-insensitive alias table. Semantic objects already use schema keys,
//! but go through the same resolution so a model answering `"Cena"` instead
//! of `"price"` still lands in the right field.
//!
//! Unknown labels become params verbatim. Records without an `item_id` are
//! rejected; a repeated `item_id` within one document keeps the first
//! record.

use crate::pricelist::parse_lenient_decimal;
use crate::record::{CanonicalField, ExtractedRows, ExtractionResult, Params, ProductRecord};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, warn};

/// Header aliases for canonical fields, lowercase.
const FIELD_ALIASES: &[(&str, CanonicalField)] = &[
    ("code", CanonicalField::ItemId),
    ("product code", CanonicalField::ItemId),
    ("sku", CanonicalField::ItemId),
    ("id", CanonicalField::ItemId),
    ("article", CanonicalField::ItemId),
    ("art.", CanonicalField::ItemId),
    ("kód", CanonicalField::ItemId),
    ("produktový kód", CanonicalField::ItemId),
    ("codice", CanonicalField::ItemId),
    ("name", CanonicalField::Name),
    ("product", CanonicalField::Name),
    ("product name", CanonicalField::Name),
    ("název", CanonicalField::Name),
    ("název produktu", CanonicalField::Name),
    ("nome", CanonicalField::Name),
    ("description", CanonicalField::Description),
    ("popis", CanonicalField::Description),
    ("descrizione", CanonicalField::Description),
    ("category", CanonicalField::Categories),
    ("kategorie", CanonicalField::Categories),
    ("hlavní kategorie", CanonicalField::Categories),
    ("price", CanonicalField::Price),
    ("cena", CanonicalField::Price),
    ("cena (eur)", CanonicalField::Price),
    ("prezzo", CanonicalField::Price),
    ("weight", CanonicalField::Weight),
    ("váha", CanonicalField::Weight),
    ("váha (kg)", CanonicalField::Weight),
    ("peso", CanonicalField::Weight),
    ("width", CanonicalField::Width),
    ("šířka", CanonicalField::Width),
    ("height", CanonicalField::Height),
    ("výška", CanonicalField::Height),
    ("thickness", CanonicalField::Thickness),
    ("tloušťka", CanonicalField::Thickness),
    ("spessore", CanonicalField::Thickness),
    ("image", CanonicalField::MainImageUrl),
    ("image_url", CanonicalField::MainImageUrl),
    ("hlavní obrázek", CanonicalField::MainImageUrl),
    ("images", CanonicalField::AdditionalImageUrls),
];

/// Header aliases for well-known param keys, lowercase.
const PARAM_ALIASES: &[(&str, &str)] = &[
    ("colour", "colour"),
    ("surface", "surface"),
    ("size", "size"),
    ("color", "colour"),
    ("barva", "colour"),
    ("colore", "colour"),
    ("finish", "surface"),
    ("povrch", "surface"),
    ("superficie", "surface"),
    ("format", "size"),
    ("formát", "size"),
    ("rozměr", "size"),
    ("formato", "size"),
    ("manufacturer", "manufacturer"),
    ("výrobce", "manufacturer"),
    ("název keramičky", "manufacturer"),
    ("kolekce", "collection"),
    ("collezione", "collection"),
    ("název kolekce", "collection"),
];

/// Where a column's values go.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Field(CanonicalField),
    Param(String),
}

fn fold_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Resolve one column label.
fn resolve_label(label: &str) -> Target {
    let folded = fold_label(label);
    if let Some(field) = CanonicalField::from_name(&folded) {
        return Target::Field(field);
    }
    if let Some((_, field)) = FIELD_ALIASES.iter().find(|(a, _)| *a == folded) {
        return Target::Field(*field);
    }
    if let Some((_, key)) = PARAM_ALIASES.iter().find(|(a, _)| *a == folded) {
        return Target::Param((*key).to_string());
    }
    Target::Param(label.trim().to_string())
}

/// Resolve a whole header. When nothing maps to `item_id`, the first
/// column is taken as the product code (candidate rows start with one).
fn column_plan(columns: &[String]) -> Vec<Target> {
    let mut plan: Vec<Target> = columns.iter().map(|c| resolve_label(c)).collect();
    let has_id = plan.contains(&Target::Field(CanonicalField::ItemId));
    if !has_id {
        if let Some(first) = plan.first_mut() {
            debug!("No item_id column among {:?}; using the first column", columns);
            *first = Target::Field(CanonicalField::ItemId);
        }
    }
    plan
}

/// Normalized records of one document plus what was dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRecords {
    pub records: Vec<ProductRecord>,
    /// Rows without an item_id.
    pub rejected: usize,
    /// Rows repeating an earlier item_id.
    pub duplicates: usize,
}

/// Normalize one stage's rows.
pub fn normalize(result: &ExtractionResult) -> NormalizedRecords {
    let drafts: Vec<RecordDraft> = match &result.rows {
        ExtractedRows::Tabular { columns, rows } => {
            let plan = column_plan(columns);
            rows.iter()
                .map(|row| {
                    let mut draft = RecordDraft::default();
                    for (target, cell) in plan.iter().zip(&row.cells) {
                        draft.set(target, cell);
                    }
                    draft
                })
                .collect()
        }
        ExtractedRows::Structured { objects, .. } => objects.iter().map(draft_from_object).collect(),
    };

    let mut out = NormalizedRecords::default();
    let mut seen: HashSet<String> = HashSet::new();

    for draft in drafts {
        let Some(record) = draft.finish() else {
            out.rejected += 1;
            continue;
        };
        if !seen.insert(record.item_id.clone()) {
            debug!("Duplicate item_id '{}' dropped", record.item_id);
            out.duplicates += 1;
            continue;
        }
        out.records.push(record);
    }

    if out.rejected > 0 {
        warn!("{} {} rows rejected for a missing item_id", out.rejected, result.method);
    }
    out
}

fn draft_from_object(object: &Map<String, Value>) -> RecordDraft {
    let mut draft = RecordDraft::default();
    for (key, value) in object {
        if key == "params" {
            if let Value::Object(params) = value {
                for (k, v) in params {
                    if let Some(text) = value_text(v) {
                        draft.set(&Target::Param(k.trim().to_string()), &text);
                    }
                }
                continue;
            }
        }
        let target = resolve_label(key);
        if target == Target::Field(CanonicalField::AdditionalImageUrls) {
            if let Value::Array(items) = value {
                for url in items.iter().filter_map(Value::as_str) {
                    draft.push_image(url);
                }
                continue;
            }
        }
        if let (Target::Field(f), Value::Number(n)) = (&target, value) {
            if f.is_numeric() {
                draft.set_decimal(*f, json_decimal(n));
                continue;
            }
        }
        if let Some(text) = value_text(value) {
            draft.set(&target, &text);
        }
    }
    draft
}

fn json_decimal(n: &serde_json::Number) -> Option<Decimal> {
    let s = n.to_string();
    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .ok()
}

/// String form of a JSON value; `None` for null and blank strings.
fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// A record under construction. The first non-empty value for a field wins.
#[derive(Debug, Default)]
struct RecordDraft {
    item_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    categories: Option<String>,
    price: Option<Decimal>,
    weight: Option<Decimal>,
    width: Option<Decimal>,
    height: Option<Decimal>,
    thickness: Option<Decimal>,
    main_image_url: Option<String>,
    additional_image_urls: Vec<String>,
    params: Params,
}

impl RecordDraft {
    fn set(&mut self, target: &Target, raw: &str) {
        let value = raw.trim();
        if value.is_empty() {
            return;
        }
        match target {
            Target::Param(key) => {
                self.params.insert(key.as_str(), value);
            }
            Target::Field(field) if field.is_numeric() => {
                self.set_decimal(*field, parse_lenient_decimal(value));
            }
            Target::Field(CanonicalField::AdditionalImageUrls) => {
                for url in value.split(',') {
                    self.push_image(url);
                }
            }
            Target::Field(field) => {
                let slot = match field {
                    CanonicalField::ItemId => &mut self.item_id,
                    CanonicalField::Name => &mut self.name,
                    CanonicalField::Description => &mut self.description,
                    CanonicalField::Categories => &mut self.categories,
                    _ => &mut self.main_image_url,
                };
                if slot.is_none() {
                    *slot = Some(value.to_string());
                }
            }
        }
    }

    fn set_decimal(&mut self, field: CanonicalField, value: Option<Decimal>) {
        let slot = match field {
            CanonicalField::Price => &mut self.price,
            CanonicalField::Weight => &mut self.weight,
            CanonicalField::Width => &mut self.width,
            CanonicalField::Height => &mut self.height,
            CanonicalField::Thickness => &mut self.thickness,
            _ => return,
        };
        if slot.is_none() {
            *slot = value;
        }
    }

    fn push_image(&mut self, url: &str) {
        let url = url.trim();
        if !url.is_empty() && !self.additional_image_urls.iter().any(|u| u == url) {
            self.additional_image_urls.push(url.to_string());
        }
    }

    /// `None` when there is no usable item_id.
    fn finish(self) -> Option<ProductRecord> {
        let item_id = self.item_id.filter(|id| !id.trim().is_empty())?;
        Some(ProductRecord {
            item_id,
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            categories: self.categories.unwrap_or_default(),
            price: self.price,
            weight: self.weight,
            width: self.width,
            height: self.height,
            thickness: self.thickness,
            main_image_url: self.main_image_url,
            additional_image_urls: self.additional_image_urls,
            params: self.params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ExtractionMethod, RawRow};
    use serde_json::json;

    fn tabular(columns: &[&str], rows: &[&[&str]]) -> ExtractionResult {
        ExtractionResult {
            method: ExtractionMethod::Table,
            rows: ExtractedRows::Tabular {
                columns: columns.iter().map(|s| s.to_string()).collect(),
                rows: rows
                    .iter()
                    .map(|cells| RawRow {
                        cells: cells.iter().map(|s| s.to_string()).collect(),
                        method: ExtractionMethod::Table,
                        source: "cat.pdf".into(),
                    })
                    .collect(),
            },
        }
    }

    fn structured(objects: Value) -> ExtractionResult {
        let objects = match objects {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(m) => Some(m),
                    _ => None,
                })
                .collect(),
            _ => panic!("expected array"),
        };
        ExtractionResult {
            method: ExtractionMethod::Semantic,
            rows: ExtractedRows::Structured {
                source: "cat.pdf".into(),
                objects,
            },
        }
    }

    #[test]
    fn code_name_price_table() {
        let out = normalize(&tabular(&["Code", "Name", "Price"], &[&["A1", "Tile X", "12.25"]]));
        assert_eq!(out.records.len(), 1);
        let r = &out.records[0];
        assert_eq!(r.item_id, "A1");
        assert_eq!(r.name, "Tile X");
        assert_eq!(r.price, Some(Decimal::from_str("12.25").unwrap()));
        assert!(r.params.is_empty());
    }

    #[test]
    fn aliases_are_case_insensitive_and_multilingual() {
        let out = normalize(&tabular(
            &["KÓD", "Název produktu", "Cena", "Váha (kg)", "Barva", "Rettifica"],
            &[&["M100", "Calacatta", "45,00 €", "22,5", "Bianco", "sì"]],
        ));
        let r = &out.records[0];
        assert_eq!(r.item_id, "M100");
        assert_eq!(r.name, "Calacatta");
        assert_eq!(r.price, Some(Decimal::from_str("45.00").unwrap()));
        assert_eq!(r.weight, Some(Decimal::from_str("22.5").unwrap()));
        assert_eq!(r.params.get("colour"), Some("Bianco"));
        assert_eq!(r.params.get("Rettifica"), Some("sì"));
    }

    #[test]
    fn empty_item_ids_are_rejected_and_duplicates_dropped() {
        let out = normalize(&tabular(
            &["Code", "Name"],
            &[&["A1", "first"], &["  ", "blank"], &["A1", "second"], &["B2", "other"]],
        ));
        assert_eq!(out.rejected, 1);
        assert_eq!(out.duplicates, 1);
        let ids: Vec<&str> = out.records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B2"]);
        assert_eq!(out.records[0].name, "first");
    }

    #[test]
    fn positional_columns_use_first_as_item_id() {
        let out = normalize(&tabular(&["col0", "col1", "col2"], &[&["60x60", "Grey", "12,25"]]));
        let r = &out.records[0];
        assert_eq!(r.item_id, "60x60");
        assert_eq!(r.params.get("col1"), Some("Grey"));
        assert_eq!(r.params.get("col2"), Some("12,25"));
    }

    #[test]
    fn unparseable_numerics_are_omitted() {
        let out = normalize(&tabular(&["Code", "Price"], &[&["A1", "on request"]]));
        assert_eq!(out.records[0].price, None);
    }

    #[test]
    fn semantic_objects_flatten_params_and_images() {
        let out = normalize(&structured(json!([
            {
                "item_id": "A1",
                "name": "Tile X",
                "price": 12.5,
                "width": "60 cm",
                "additional_image_urls": ["http://x/1.jpg", "http://x/2.jpg"],
                "params": { "surface": "matt", "anti_slip": "R10", "pieces": 4 }
            },
            { "name": "no code" },
            { "Cena": "9,90", "Kód": "B2", "size": "30x60" }
        ])));
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.rejected, 1);

        let a = &out.records[0];
        assert_eq!(a.price, Some(Decimal::from_str("12.5").unwrap()));
        assert_eq!(a.width, Some(Decimal::from(60)));
        assert_eq!(a.additional_image_urls.len(), 2);
        assert_eq!(a.params.get("surface"), Some("matt"));
        assert_eq!(a.params.get("pieces"), Some("4"));

        let b = &out.records[1];
        assert_eq!(b.item_id, "B2");
        assert_eq!(b.price, Some(Decimal::from_str("9.90").unwrap()));
        assert_eq!(b.params.get("size"), Some("30x60"));
    }

    #[test]
    fn params_never_shadow_canonical_fields() {
        let out = normalize(&structured(json!([
            { "item_id": "A1", "params": { "price": "5", "colour": "red" } }
        ])));
        let r = &out.records[0];
        assert_eq!(r.price, None);
        assert_eq!(r.params.get("price"), None);
        assert_eq!(r.params.len(), 1);
    }
}
