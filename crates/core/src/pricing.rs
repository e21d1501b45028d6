//! Price normalisation and offer selection.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::models::{Currency, Item, Offer};

static DEFAULT_RATES: Lazy<Vec<(Currency, f64)>> =
    Lazy::new(|| vec![(Currency::Usd, 125.0), (Currency::Eur, 135.0)]);

/// Static conversion table into a single base currency.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRates {
    base: Currency,
    rates: BTreeMap<Currency, f64>,
}

impl Default for ExchangeRates {
    fn default() -> Self {
        Self::new(Currency::Rub, DEFAULT_RATES.iter().cloned())
    }
}

impl ExchangeRates {
    /// Build a table converting into `base`. A rate given for the base
    /// currency itself is ignored.
    pub fn new(base: Currency, rates: impl IntoIterator<Item = (Currency, f64)>) -> Self {
        let rates = rates
            .into_iter()
            .filter(|(currency, _)| *currency != base)
            .collect();
        Self { base, rates }
    }

    /// Currency all prices are converted into.
    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Configured `(currency, multiplier)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, f64)> + '_ {
        self.rates.iter().map(|(currency, rate)| (currency, *rate))
    }

    /// Convert `price` into the base currency. Currencies without a rate
    /// pass through unchanged.
    pub fn convert(&self, price: f64, currency: &Currency) -> f64 {
        match self.rates.get(currency) {
            Some(rate) => price * rate,
            None => price,
        }
    }

    /// Cheapest offer after conversion; the first of equal minima wins.
    pub fn best_buy<'a>(&self, offers: &'a [Offer]) -> Option<&'a Offer> {
        let mut best: Option<(&Offer, f64)> = None;
        for offer in offers {
            let value = self.convert(offer.price, &offer.currency);
            match best {
                Some((_, lowest)) if value >= lowest => {}
                _ => best = Some((offer, value)),
            }
        }
        best.map(|(offer, _)| offer)
    }

    /// Priciest offer after conversion. Only strictly positive values can
    /// win, so a list of zero prices has no best sell.
    pub fn best_sell<'a>(&self, offers: &'a [Offer]) -> Option<&'a Offer> {
        let mut best = None;
        let mut highest = 0.0;
        for offer in offers {
            let value = self.convert(offer.price, &offer.currency);
            if value > highest {
                highest = value;
                best = Some(offer);
            }
        }
        best
    }

    /// Best buy and best sell offer for an item, either side possibly absent.
    pub fn best_offers<'a>(&self, item: &'a Item) -> (Option<&'a Offer>, Option<&'a Offer>) {
        (self.best_buy(&item.buy_for), self.best_sell(&item.sell_for))
    }

    /// One-line buy/sell summary for an item.
    pub fn trader_summary(&self, item: &Item) -> String {
        let (buy, sell) = self.best_offers(item);
        let parts: Vec<String> = [("Buy", buy), ("Sell", sell)]
            .into_iter()
            .filter_map(|(side, offer)| {
                offer.map(|offer| format!("{side}: {}", describe_offer(offer)))
            })
            .collect();
        if parts.is_empty() {
            NO_PRICE_DATA.to_string()
        } else {
            parts.join(" - ")
        }
    }
}

/// Shown when an item has neither a buy nor a sell offer.
pub const NO_PRICE_DATA: &str = "No price data";

/// `₽1,000 (Vendor)` label for one offer.
pub fn describe_offer(offer: &Offer) -> String {
    format!(
        "{} ({})",
        format_price(offer.price, &offer.currency),
        offer.vendor.name
    )
}

/// Render a price with digit grouping and the currency's symbol, or the
/// currency code as a suffix when it has none.
pub fn format_price(price: f64, currency: &Currency) -> String {
    let number = group_digits(price);
    match currency.symbol() {
        Some(symbol) => format!("{symbol}{number}"),
        None => format!("{number} {}", currency.code()),
    }
}

fn group_digits(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    // Up to three fraction digits, trailing zeros dropped.
    let rounded = format!("{:.3}", value.abs());
    let (whole, fraction) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if !fraction.is_empty() {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    if value < 0.0 && grouped.chars().any(|ch| ch.is_ascii_digit() && ch != '0') {
        grouped.insert(0, '-');
    }
    grouped
}
