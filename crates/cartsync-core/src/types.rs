//! # Domain Types
//!
//! Product references, wishlist entries and the session mode.
//!
//! ## Two Shapes, One Identity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ProductRef (tagged union)                          │
//! │                                                                         │
//! │  Guest storage                      Shop API (signed in)                │
//! │  ─────────────                      ────────────────────                │
//! │  "64f1c0ffee"                       { "_id": "64f1c0ffee",              │
//! │                                       "name": "Linen Shirt",            │
//! │                                       "price": 4900, ... }              │
//! │        │                                    │                           │
//! │        ▼                                    ▼                           │
//! │  ProductRef::Id(..)               ProductRef::Embedded(..)              │
//! │        │                                    │                           │
//! │        └──────────────► .id() ◄─────────────┘                           │
//! │                     "64f1c0ffee"                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Call sites never inspect which variant they hold; they ask for `id()`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::money::Money;

// =============================================================================
// Product Snapshot
// =============================================================================

/// Product data embedded by the shop API in cart lines and wishlists.
///
/// Only the fields the engine reads are typed; everything else the API sends
/// (images, slugs, ratings) is preserved in `extra` for the presentation
/// layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Canonical product id.
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Current unit price in cents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProductSnapshot {
    /// Creates a snapshot with only an id, for tests and fakes.
    pub fn new(id: impl Into<String>) -> Self {
        ProductSnapshot {
            id: id.into(),
            name: None,
            price: None,
            extra: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }
}

// =============================================================================
// Product Reference
// =============================================================================

/// A reference to a product: either a bare id or an embedded snapshot.
///
/// Deserializes from a JSON string or a JSON object carrying `_id`, matching
/// both the guest storage slots and the shop API payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductRef {
    /// Bare product id (guest mode).
    Id(String),
    /// Embedded product record (authenticated mode).
    Embedded(ProductSnapshot),
}

impl ProductRef {
    /// Canonical product id, whichever shape this reference has.
    pub fn id(&self) -> &str {
        match self {
            ProductRef::Id(id) => id,
            ProductRef::Embedded(product) => &product.id,
        }
    }

    /// Returns true if this reference points at `product_id`.
    pub fn matches(&self, product_id: &str) -> bool {
        self.id() == product_id
    }

    /// Embedded product data, if the API sent any.
    pub fn snapshot(&self) -> Option<&ProductSnapshot> {
        match self {
            ProductRef::Id(_) => None,
            ProductRef::Embedded(product) => Some(product),
        }
    }
}

impl From<&str> for ProductRef {
    fn from(id: &str) -> Self {
        ProductRef::Id(id.to_string())
    }
}

impl From<String> for ProductRef {
    fn from(id: String) -> Self {
        ProductRef::Id(id)
    }
}

impl From<ProductSnapshot> for ProductRef {
    fn from(product: ProductSnapshot) -> Self {
        ProductRef::Embedded(product)
    }
}

/// A wishlist entry is a product reference in either shape.
pub type WishlistEntry = ProductRef;

/// Returns true if any entry in `wishlist` refers to `product_id`.
pub fn wishlist_contains(wishlist: &[WishlistEntry], product_id: &str) -> bool {
    wishlist.iter().any(|entry| entry.matches(product_id))
}

// =============================================================================
// Session Mode
// =============================================================================

/// Which backend is authoritative for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Unauthenticated; state comes from local storage only.
    #[default]
    Guest,
    /// Signed in; state comes from the shop API only.
    Authenticated,
}

impl Mode {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Mode::Authenticated)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Guest => write!(f, "guest"),
            Mode::Authenticated => write!(f, "authenticated"),
        }
    }
}
