//! Shared domain models.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single catalog entry as returned by the items query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Stable catalog identifier.
    pub id: String,
    /// English display name.
    pub name: String,
    /// Inventory width in grid cells.
    #[serde(default)]
    pub width: i64,
    /// Inventory height in grid cells.
    #[serde(default)]
    pub height: i64,
    /// Offers from vendors willing to buy this item.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sell_for: Vec<Offer>,
    /// Offers from vendors selling this item.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub buy_for: Vec<Offer>,
}

impl Item {
    /// Grid footprint rendered as `WxH`.
    pub fn size_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// A priced opportunity to buy or sell an item at a vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Price in `currency` units.
    pub price: f64,
    /// Currency the price is expressed in.
    pub currency: Currency,
    /// Vendor offering the price.
    pub vendor: Vendor,
}

/// Trader or market offering a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    /// Vendor display name.
    pub name: String,
}

/// Currency code attached to an offer.
///
/// Codes outside the well-known set are kept verbatim so that a new
/// currency on the remote side never breaks decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Currency {
    /// Roubles.
    Rub,
    /// US dollars.
    Usd,
    /// Euros.
    Eur,
    /// Any other code, upper-cased.
    Other(String),
}

impl Currency {
    /// Canonical currency code.
    pub fn code(&self) -> &str {
        match self {
            Currency::Rub => "RUB",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Other(code) => code,
        }
    }

    /// Symbol prefixed to formatted prices, if the currency has one.
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Currency::Rub => Some("₽"),
            Currency::Usd => Some("$"),
            Currency::Eur => Some("€"),
            Currency::Other(_) => None,
        }
    }
}

impl From<&str> for Currency {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "RUB" => Currency::Rub,
            "USD" => Currency::Usd,
            "EUR" => Currency::Eur,
            other => Currency::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for Currency {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Currency::from(raw.as_str()))
    }
}

/// Envelope returned by the GraphQL endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CatalogResponse {
    /// Query result; absent when the API reports errors only.
    #[serde(default)]
    pub data: Option<CatalogData>,
    /// GraphQL errors reported alongside (or instead of) data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,
}

impl CatalogResponse {
    /// Wrap a list of items in a successful response.
    pub fn from_items(items: Vec<Item>) -> Self {
        Self {
            data: Some(CatalogData { items }),
            errors: Vec::new(),
        }
    }

    /// Items carried by the response, empty when there is no data.
    pub fn items(&self) -> &[Item] {
        self.data
            .as_ref()
            .map(|data| data.items.as_slice())
            .unwrap_or(&[])
    }

    /// Consume the response and return its items.
    pub fn into_items(self) -> Vec<Item> {
        self.data.map(|data| data.items).unwrap_or_default()
    }
}

/// The `data` member of a catalog response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CatalogData {
    /// Every item in the catalog.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<Item>,
}

/// Error entry reported by a GraphQL server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human readable message.
    pub message: String,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
