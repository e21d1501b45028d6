//! Display ordering for the selection list.

use std::{cmp::Ordering, collections::HashMap, fmt, str::FromStr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use tracing::warn;

use crate::{
    models::Item,
    pricing::ExchangeRates,
    storage::{KeyValueStore, SORT_KEY},
};

/// Available orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    /// Name, A to Z.
    NameAsc,
    /// Name, Z to A.
    NameDesc,
    /// Cheapest buy price first.
    BuyAsc,
    /// Most expensive buy price first.
    BuyDesc,
    /// Lowest sell price first.
    SellAsc,
    /// Highest sell price first.
    SellDesc,
}

impl SortKey {
    /// Every key in selector order.
    pub const ALL: [SortKey; 6] = [
        SortKey::NameAsc,
        SortKey::NameDesc,
        SortKey::BuyAsc,
        SortKey::BuyDesc,
        SortKey::SellAsc,
        SortKey::SellDesc,
    ];

    /// Persisted identifier, e.g. `name-asc`.
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::NameAsc => "name-asc",
            SortKey::NameDesc => "name-desc",
            SortKey::BuyAsc => "buy-asc",
            SortKey::BuyDesc => "buy-desc",
            SortKey::SellAsc => "sell-asc",
            SortKey::SellDesc => "sell-desc",
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            SortKey::NameAsc => "Name (A-Z)",
            SortKey::NameDesc => "Name (Z-A)",
            SortKey::BuyAsc => "Buy price (low-high)",
            SortKey::BuyDesc => "Buy price (high-low)",
            SortKey::SellAsc => "Sell price (low-high)",
            SortKey::SellDesc => "Sell price (high-low)",
        }
    }

    /// Following key in selector order, wrapping around.
    pub fn next(self) -> SortKey {
        let idx = Self::ALL.iter().position(|key| *key == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == value.trim())
            .ok_or_else(|| anyhow!("unknown sort key: {value}"))
    }
}

/// Order `ids` for display. Without a key the input order is kept; ids with
/// no catalog entry keep their relative order after all known items.
pub fn sort_ids(
    ids: &[String],
    items: &[Item],
    key: Option<SortKey>,
    rates: &ExchangeRates,
) -> Vec<String> {
    let mut ordered = ids.to_vec();
    let Some(key) = key else {
        return ordered;
    };

    let index: HashMap<&str, &Item> = items.iter().map(|item| (item.id.as_str(), item)).collect();
    ordered.sort_by(|a, b| {
        match (index.get(a.as_str()), index.get(b.as_str())) {
            (Some(left), Some(right)) => compare(left, right, key, rates),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    ordered
}

fn compare(left: &Item, right: &Item, key: SortKey, rates: &ExchangeRates) -> Ordering {
    match key {
        SortKey::NameAsc => compare_names(&left.name, &right.name),
        SortKey::NameDesc => compare_names(&right.name, &left.name),
        SortKey::BuyAsc => compare_prices(buy_price(left, rates), buy_price(right, rates)),
        SortKey::BuyDesc => compare_prices(buy_price(right, rates), buy_price(left, rates)),
        SortKey::SellAsc => compare_prices(sell_price(left, rates), sell_price(right, rates)),
        SortKey::SellDesc => compare_prices(sell_price(right, rates), sell_price(left, rates)),
    }
}

/// Case-insensitive first, then by the exact text.
fn compare_names(left: &str, right: &str) -> Ordering {
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(right))
}

fn compare_prices(left: f64, right: f64) -> Ordering {
    left.partial_cmp(&right).unwrap_or(Ordering::Equal)
}

/// Raw price of the best buy offer; unpriced items sort as infinitely
/// expensive. A zero price counts as unpriced.
pub fn buy_price(item: &Item, rates: &ExchangeRates) -> f64 {
    rates
        .best_buy(&item.buy_for)
        .map(|offer| offer.price)
        .filter(|price| *price != 0.0)
        .unwrap_or(f64::INFINITY)
}

/// Raw price of the best sell offer; unpriced items sort as zero.
pub fn sell_price(item: &Item, rates: &ExchangeRates) -> f64 {
    rates
        .best_sell(&item.sell_for)
        .map(|offer| offer.price)
        .unwrap_or(0.0)
}

/// Remembers the last chosen sort key across sessions.
pub struct SortPreference {
    store: Arc<dyn KeyValueStore>,
}

impl SortPreference {
    /// Preference backed by `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Previously saved key. Unknown values read as no preference.
    pub fn load(&self) -> Option<SortKey> {
        match self.store.get(SORT_KEY) {
            Ok(Some(raw)) => match raw.parse() {
                Ok(key) => Some(key),
                Err(err) => {
                    warn!(%err, "ignoring stored sort preference");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(?err, "failed to read sort preference");
                None
            }
        }
    }

    /// Save `key` as the default for the next session.
    pub fn save(&self, key: SortKey) -> Result<()> {
        self.store
            .set(SORT_KEY, key.as_str().to_string())
            .context("failed to persist sort preference")
    }
}
