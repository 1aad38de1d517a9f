//! Schemas on both sides of the pipeline.
//!
//! [`FieldSchema`] is what the semantic stage shows the language model: the
//! canonical [`ProductRecord`] shape as named, typed, described fields.
//! [`FeedSchema`] is the destination: the ordered columns of the shop feed
//! and where each column's value comes from in a record.

use crate::record::{CanonicalField, ProductRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Value type of a canonical field as advertised to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Decimal,
    StringList,
    Object,
}

/// One named field of the extraction schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub description: String,
}

/// The record shape requested from the semantic stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub fields: Vec<FieldSpec>,
}

impl FieldSchema {
    /// The canonical product record, with `params` listing the param keys
    /// the destination feed knows about.
    pub fn product_record(param_keys: &[String]) -> Self {
        let mut fields: Vec<FieldSpec> = CanonicalField::ALL
            .into_iter()
            .map(|f| FieldSpec {
                name: f.as_str().to_string(),
                kind: kind_of(f),
                description: describe(f).to_string(),
            })
            .collect();

        let params = if param_keys.is_empty() {
            "Any other product attribute as a string value.".to_string()
        } else {
            format!(
                "Any other product attribute as a string value. Known keys: {}.",
                param_keys.join(", ")
            )
        };
        fields.push(FieldSpec {
            name: "params".into(),
            kind: FieldKind::Object,
            description: params,
        });

        Self { fields }
    }

    pub fn to_json(&self) -> Value {
        let fields: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    json!({ "type": f.kind, "description": f.description }),
                )
            })
            .collect();
        Value::Object(fields)
    }
}

fn kind_of(field: CanonicalField) -> FieldKind {
    match field {
        CanonicalField::AdditionalImageUrls => FieldKind::StringList,
        f if f.is_numeric() => FieldKind::Decimal,
        _ => FieldKind::String,
    }
}

fn describe(field: CanonicalField) -> &'static str {
    match field {
        CanonicalField::ItemId => "Product code exactly as printed. Required.",
        CanonicalField::Name => "Product name.",
        CanonicalField::Description => "Free-text description, if any.",
        CanonicalField::Categories => "Main category, e.g. floor tiles.",
        CanonicalField::Price => "Unit price as printed, if the catalog shows one.",
        CanonicalField::Weight => "Weight in kg.",
        CanonicalField::Width => "Width in cm.",
        CanonicalField::Height => "Height in cm.",
        CanonicalField::Thickness => "Thickness in mm.",
        CanonicalField::MainImageUrl => "URL of the main product image.",
        CanonicalField::AdditionalImageUrls => "URLs of further product images.",
    }
}

// ── Destination feed ─────────────────────────────────────────────────────

/// Where a feed column takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    Field(CanonicalField),
    Param(String),
}

/// One destination column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedColumn {
    /// Spreadsheet column letter.
    pub letter: String,
    pub label: String,
    pub source: FeedSource,
}

/// Ordered destination columns of a shop feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSchema {
    pub name: String,
    pub columns: Vec<FeedColumn>,
}

impl FeedSchema {
    /// The Heureka tile-shop feed, columns A–U.
    pub fn heureka() -> Self {
        use CanonicalField as F;
        use FeedSource::{Field, Param};

        let spec: [(&str, FeedSource); 21] = [
            ("Název Keramičky", Param("manufacturer".into())),
            ("Název kolekce", Param("collection".into())),
            ("Produktový kód", Field(F::ItemId)),
            ("Název produktu", Field(F::Name)),
            ("Barva", Param("colour".into())),
            ("Materiál-Rektifikovaný", Param("rectified".into())),
            ("Povrch", Param("surface".into())),
            ("Hlavní obrázek", Field(F::MainImageUrl)),
            ("Váha (kg)", Field(F::Weight)),
            ("Šířka", Field(F::Width)),
            ("Výška", Field(F::Height)),
            ("Tloušťka", Field(F::Thickness)),
            ("Specifikace (Protiskluz R9–R12)", Param("anti_slip".into())),
            ("Tvar", Param("shape".into())),
            ("Estetický vzhled", Param("look".into())),
            ("Cena (EUR)", Field(F::Price)),
            ("Materiál (typ střepu)", Param("body_material".into())),
            ("Použití", Param("usage".into())),
            ("Hlavní kategorie", Field(F::Categories)),
            ("Jednotka", Param("unit".into())),
            ("Velikost balení", Param("package_size".into())),
        ];

        let columns = spec
            .into_iter()
            .zip(b'A'..)
            .map(|((label, source), letter)| FeedColumn {
                letter: char::from(letter).to_string(),
                label: label.to_string(),
                source,
            })
            .collect();

        Self {
            name: "heureka".into(),
            columns,
        }
    }

    /// Look up a built-in schema by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "heureka" => Some(Self::heureka()),
            _ => None,
        }
    }

    /// Param keys referenced by any column, in column order.
    pub fn param_keys(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter_map(|c| match &c.source {
                FeedSource::Param(k) => Some(k.clone()),
                FeedSource::Field(_) => None,
            })
            .collect()
    }

    /// Render one record as cell values, one per column.
    pub fn row_for(&self, record: &ProductRecord) -> Vec<String> {
        self.columns.iter().map(|c| value_for(&c.source, record)).collect()
    }
}

/// The cell value for `source` in `record`; empty when absent.
pub fn value_for(source: &FeedSource, record: &ProductRecord) -> String {
    let decimal = |d: Option<rust_decimal::Decimal>| d.map(|v| v.to_string()).unwrap_or_default();
    match source {
        FeedSource::Param(key) => record.params.get(key).unwrap_or_default().to_string(),
        FeedSource::Field(field) => match field {
            CanonicalField::ItemId => record.item_id.clone(),
            CanonicalField::Name => record.name.clone(),
            CanonicalField::Description => record.description.clone(),
            CanonicalField::Categories => record.categories.clone(),
            CanonicalField::Price => decimal(record.price),
            CanonicalField::Weight => decimal(record.weight),
            CanonicalField::Width => decimal(record.width),
            CanonicalField::Height => decimal(record.height),
            CanonicalField::Thickness => decimal(record.thickness),
            CanonicalField::MainImageUrl => record.main_image_url.clone().unwrap_or_default(),
            CanonicalField::AdditionalImageUrls => record.additional_image_urls.join(","),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Params;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn record() -> ProductRecord {
        let mut params = Params::new();
        params.insert("colour", "Bianco");
        ProductRecord {
            item_id: "A1".into(),
            name: "Tile X".into(),
            description: String::new(),
            categories: "Obklady".into(),
            price: Some(Decimal::from_str("12.25").unwrap()),
            weight: None,
            width: Some(Decimal::from(60)),
            height: Some(Decimal::from(60)),
            thickness: None,
            main_image_url: None,
            additional_image_urls: vec![],
            params,
        }
    }

    #[test]
    fn heureka_has_columns_a_to_u() {
        let schema = FeedSchema::heureka();
        assert_eq!(schema.columns.len(), 21);
        assert_eq!(schema.columns[0].letter, "A");
        assert_eq!(schema.columns[20].letter, "U");
        assert_eq!(schema.columns[2].source, FeedSource::Field(CanonicalField::ItemId));
        assert_eq!(schema.columns[15].label, "Cena (EUR)");
    }

    #[test]
    fn row_takes_fields_and_params() {
        let schema = FeedSchema::heureka();
        let row = schema.row_for(&record());
        assert_eq!(row[2], "A1");
        assert_eq!(row[4], "Bianco");
        assert_eq!(row[15], "12.25");
        assert_eq!(row[0], "", "missing params render empty");
    }

    #[test]
    fn field_schema_lists_every_canonical_field_and_params() {
        let keys = FeedSchema::heureka().param_keys();
        let schema = FieldSchema::product_record(&keys);
        assert_eq!(schema.fields.len(), CanonicalField::ALL.len() + 1);
        let json = schema.to_json();
        assert_eq!(json["price"]["type"], "decimal");
        assert!(json["params"]["description"]
            .as_str()
            .unwrap()
            .contains("anti_slip"));
    }

    #[test]
    fn schema_lookup_by_name() {
        assert!(FeedSchema::by_name("Heureka").is_some());
        assert!(FeedSchema::by_name("google").is_none());
    }
}
