//! Price-list parsing: raw text and spreadsheets → one merged [`PriceMap`].
//!
//! Price lists arrive as exported text where every useful line reads
//! `<key> <whitespace> <amount> <currency>`, e.g.
//! `60x60 - Rettificato    12,25 €`. Anything else on the page (titles,
//! blank lines, footnotes) simply does not match and is skipped. A line that
//! matches but whose amount is not a number is reported as
//! [`PriceLineError::Malformed`] and dropped; it never aborts parsing.
//!
//! Spreadsheet lists are read with `calamine`; the first two columns of
//! every sheet are taken as (key, price).

use crate::config::DuplicateKeyPolicy;
use crate::error::{CatalogError, PriceLineError};
use crate::record::{PriceEntry, PriceListReport, PriceMap};
use calamine::{Data, Reader};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::io::Cursor;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// One supplied price source.
#[derive(Debug, Clone)]
pub enum PriceSource {
    /// Plain text, one entry per line.
    Text { name: String, text: String },
    /// xlsx / xls / ods bytes.
    Spreadsheet { name: String, bytes: Vec<u8> },
}

impl PriceSource {
    pub fn name(&self) -> &str {
        match self {
            PriceSource::Text { name, .. } | PriceSource::Spreadsheet { name, .. } => name,
        }
    }
}

/// Entries parsed from a single source, in line order.
#[derive(Debug, Clone, Default)]
pub struct ParsedPriceList {
    pub name: String,
    pub entries: Vec<PriceEntry>,
    pub malformed: Vec<PriceLineError>,
}

// Grouped amounts (`1 234,50`, `1.234,50`, `1,234.50`) come first so the lazy
// key stops before their leading digits; `\S+?` still catches junk amounts
// so they can be reported.
static RE_PRICE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<key>.+?)\s+(?P<amount>-?\d{1,3}(?:[ \x{A0}.,]\d{3})+(?:[.,]\d+)?|\S+?)\s*(?:€|eur|kč|czk|usd|\$)\s*$",
    )
    .unwrap()
});

/// Parse a decimal amount written with either decimal convention.
///
/// `12,25` and `12.25` both give `12.25`. With both separators present the
/// one occurring last is the decimal point (`1.234,50` and `1,234.50` both
/// give `1234.50`); a separator repeated on its own only groups thousands
/// (`1.234.567`). Whitespace inside the amount, NBSP included, is ignored.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalised = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches(',').count() > 1 => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };
    Decimal::from_str(&normalised).ok()
}

/// Like [`parse_amount`], but first strips everything that is not a digit,
/// sign or separator (`"12,25 €"`, `"60 cm"`).
pub fn parse_lenient_decimal(raw: &str) -> Option<Decimal> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    let kept = kept.trim_matches(|c| c == '.' || c == ',');
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    parse_amount(kept)
}

/// Parse price-list text line by line.
pub fn parse_price_text(name: &str, text: &str) -> ParsedPriceList {
    let mut parsed = ParsedPriceList {
        name: name.to_string(),
        ..Default::default()
    };

    for (idx, line) in text.lines().enumerate() {
        let Some(caps) = RE_PRICE_LINE.captures(line) else {
            continue;
        };
        let key = caps["key"].trim();
        let amount = &caps["amount"];
        if key.is_empty() {
            continue;
        }
        match parse_amount(amount) {
            Some(price) => parsed.entries.push(PriceEntry {
                key: key.to_string(),
                price,
            }),
            None => {
                let err = PriceLineError::Malformed {
                    line: idx + 1,
                    amount: amount.to_string(),
                };
                warn!("Price list '{}': {} (skipped)", name, err);
                parsed.malformed.push(err);
            }
        }
    }

    info!(
        "Parsed {} price entries from '{}'",
        parsed.entries.len(),
        name
    );
    parsed
}

/// Parse a spreadsheet price list: first column key, second column price.
pub fn parse_price_sheet(name: &str, bytes: &[u8]) -> Result<ParsedPriceList, CatalogError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| {
        CatalogError::UnreadablePriceList {
            name: name.to_string(),
            detail: e.to_string(),
        }
    })?;

    let mut parsed = ParsedPriceList {
        name: name.to_string(),
        ..Default::default()
    };

    for sheet_name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(range) => range,
            Err(e) => {
                warn!("Price list '{}': sheet '{}' unreadable: {}", name, sheet_name, e);
                continue;
            }
        };

        for row in range.rows() {
            let (Some(key_cell), Some(price_cell)) = (row.first(), row.get(1)) else {
                continue;
            };
            let key = cell_text(key_cell);
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            if let Some(price) = cell_price(price_cell) {
                parsed.entries.push(PriceEntry {
                    key: key.to_string(),
                    price,
                });
            } else {
                debug!("Price list '{}': row '{}' has no usable price", name, key);
            }
        }
    }

    info!(
        "Parsed {} price entries from spreadsheet '{}'",
        parsed.entries.len(),
        name
    );
    Ok(parsed)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn cell_price(cell: &Data) -> Option<Decimal> {
    match cell {
        Data::Float(f) => Decimal::try_from(*f).ok(),
        Data::Int(i) => Some(Decimal::from(*i)),
        Data::String(s) => parse_lenient_decimal(s),
        _ => None,
    }
}

/// Merge parsed lists, in the order given, into one map.
pub fn merge_price_entries(
    lists: &[ParsedPriceList],
    policy: DuplicateKeyPolicy,
) -> (PriceMap, PriceListReport) {
    let mut map = PriceMap::new();
    let mut duplicates: HashSet<&str> = HashSet::new();
    let mut report = PriceListReport {
        sources: lists.len(),
        ..Default::default()
    };

    for list in lists {
        report.parsed_entries += list.entries.len();
        report.malformed_lines += list.malformed.len();

        for entry in &list.entries {
            if map.contains_key(&entry.key) {
                duplicates.insert(entry.key.as_str());
                debug!(
                    "Duplicate price key '{}' in '{}' ({:?})",
                    entry.key, list.name, policy
                );
                if policy == DuplicateKeyPolicy::FirstWins {
                    continue;
                }
            }
            map.insert(entry.clone());
        }
    }

    report.duplicate_keys = duplicates.len();
    report.merged_entries = map.len();
    (map, report)
}

/// Parse every source and merge the results.
///
/// # Errors
/// Returns [`CatalogError::UnreadablePriceList`] if a spreadsheet cannot be
/// opened. Malformed text lines are never errors.
pub fn build_price_map(
    sources: &[PriceSource],
    policy: DuplicateKeyPolicy,
) -> Result<(PriceMap, PriceListReport), CatalogError> {
    let mut parsed = Vec::with_capacity(sources.len());
    for source in sources {
        let list = match source {
            PriceSource::Text { name, text } => parse_price_text(name, text),
            PriceSource::Spreadsheet { name, bytes } => parse_price_sheet(name, bytes)?,
        };
        parsed.push(list);
    }

    let (map, report) = merge_price_entries(&parsed, policy);
    info!(
        "Price map ready: {} keys from {} sources ({} entries parsed, {} duplicates, {} malformed)",
        report.merged_entries,
        report.sources,
        report.parsed_entries,
        report.duplicate_keys,
        report.malformed_lines
    );
    Ok((map, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_comma_decimal_line() {
        let parsed = parse_price_text("cenik.txt", "60x60 - Rettificato    12,25 €");
        assert_eq!(
            parsed.entries,
            vec![PriceEntry {
                key: "60x60 - Rettificato".into(),
                price: dec("12.25"),
            }]
        );
    }

    #[test]
    fn non_numeric_amount_is_skipped() {
        let parsed = parse_price_text("cenik.txt", "broken - tile   abc €\n30x60   9,90 €");
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].key, "30x60");
        assert_eq!(
            parsed.malformed,
            vec![PriceLineError::Malformed {
                line: 1,
                amount: "abc".into()
            }]
        );
    }

    #[test]
    fn non_matching_lines_are_ignored() {
        let text = "CENÍK 2024\n\nFormát   Cena\n20x20 - Natural   7,50 EUR\n";
        let parsed = parse_price_text("cenik.txt", text);
        assert_eq!(parsed.entries.len(), 1);
        assert!(parsed.malformed.is_empty());
        assert_eq!(parsed.entries[0].price, dec("7.50"));
    }

    #[test]
    fn currency_marker_variants() {
        let text = "A1  10 Kč\nB2  3.5$\nC3 1.234,50 €";
        let parsed = parse_price_text("p", text);
        let prices: Vec<Decimal> = parsed.entries.iter().map(|e| e.price).collect();
        assert_eq!(prices, vec![dec("10"), dec("3.5"), dec("1234.50")]);
    }

    #[test]
    fn space_grouped_amounts_keep_their_key() {
        let parsed = parse_price_text("p", "C3   1 234,50 €\nD4   1\u{a0}234,50 €");
        assert_eq!(
            parsed.entries,
            vec![
                PriceEntry {
                    key: "C3".into(),
                    price: dec("1234.50"),
                },
                PriceEntry {
                    key: "D4".into(),
                    price: dec("1234.50"),
                },
            ]
        );
    }

    #[test]
    fn last_separator_is_the_decimal_point() {
        let parsed = parse_price_text("p", "B2   1,234.50 $");
        assert_eq!(parsed.entries[0].key, "B2");
        assert_eq!(parsed.entries[0].price, dec("1234.50"));

        assert_eq!(parse_amount("1.234,50"), Some(dec("1234.50")));
        assert_eq!(parse_amount("1,234.50"), Some(dec("1234.50")));
        assert_eq!(parse_amount("1.234.567"), Some(dec("1234567")));
        assert_eq!(parse_amount("12,25"), Some(dec("12.25")));
        assert_eq!(parse_amount("12.25"), Some(dec("12.25")));
    }

    #[test]
    fn lenient_decimal_strips_units() {
        assert_eq!(parse_lenient_decimal("60 cm"), Some(dec("60")));
        assert_eq!(parse_lenient_decimal("12,25 €"), Some(dec("12.25")));
        assert_eq!(parse_lenient_decimal("n/a"), None);
        assert_eq!(parse_lenient_decimal("1.2 kg."), Some(dec("1.2")));
    }

    #[test]
    fn merge_first_wins_by_default() {
        let a = parse_price_text("a", "A1  10,00 €");
        let b = parse_price_text("b", "A1  12,00 €\nB1  3,00 €");
        let (map, report) = merge_price_entries(&[a, b], DuplicateKeyPolicy::FirstWins);
        assert_eq!(map.get("A1"), Some(dec("10.00")));
        assert_eq!(map.len(), 2);
        assert_eq!(report.duplicate_keys, 1);
        assert_eq!(report.parsed_entries, 3);
    }

    #[test]
    fn merge_last_wins_when_configured() {
        let a = parse_price_text("a", "A1  10,00 €");
        let b = parse_price_text("b", "A1  12,00 €");
        let (map, _) = merge_price_entries(&[a, b], DuplicateKeyPolicy::LastWins);
        assert_eq!(map.get("A1"), Some(dec("12.00")));
    }

    #[test]
    fn unreadable_spreadsheet_is_an_error() {
        let err = parse_price_sheet("bad.xlsx", b"not a workbook").unwrap_err();
        assert!(matches!(err, CatalogError::UnreadablePriceList { .. }));
    }

    #[test]
    fn build_price_map_reports_counts() {
        let sources = vec![PriceSource::Text {
            name: "cenik.txt".into(),
            text: "A1  1,00 €\nbad  x €\n".into(),
        }];
        let (map, report) = build_price_map(&sources, DuplicateKeyPolicy::FirstWins).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(report.malformed_lines, 1);
        assert_eq!(report.merged_entries, 1);
    }
}
