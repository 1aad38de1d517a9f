//! Price reconciliation against the merged price map.
//!
//! Lookup order for a record without a price: exact `item_id`, then the
//! configured secondary param (default `size`, since tile price lists are
//! often keyed by format), then nothing. A price already present in the
//! record is never overwritten. Whatever price the record ends up with is
//! rounded to the configured precision, midpoint away from zero.

use crate::record::{PriceMap, ProductRecord};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::trace;

/// Matches records against a frozen [`PriceMap`].
#[derive(Debug, Clone)]
pub struct PriceReconciler {
    map: Arc<PriceMap>,
    secondary_key: Option<String>,
    precision: u32,
}

impl PriceReconciler {
    pub fn new(map: Arc<PriceMap>, secondary_key: Option<String>, precision: u32) -> Self {
        Self {
            map,
            secondary_key,
            precision,
        }
    }

    /// Reconcile one record. The flag is `true` when the price came from
    /// the map.
    pub fn reconcile(&self, record: ProductRecord) -> (ProductRecord, bool) {
        let (price, from_map) = match record.price {
            Some(existing) => (Some(existing), false),
            None => match self.lookup(&record) {
                Some(found) => (Some(found), true),
                None => (None, false),
            },
        };

        if from_map {
            trace!("Priced '{}' from price list", record.item_id);
        }

        let price = price.map(|p| self.round(p));
        (ProductRecord { price, ..record }, from_map)
    }

    fn lookup(&self, record: &ProductRecord) -> Option<Decimal> {
        self.map.get(&record.item_id).or_else(|| {
            let key = self.secondary_key.as_deref()?;
            let value = record.params.get(key)?;
            self.map.get(value.trim())
        })
    }

    fn round(&self, price: Decimal) -> Decimal {
        price.round_dp_with_strategy(self.precision, RoundingStrategy::MidpointAwayFromZero)
    }
}
