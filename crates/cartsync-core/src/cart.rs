//! # Cart Model
//!
//! Cart lines and the derived cart aggregates.
//!
//! ## Aggregates Are Never Stored
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CartState construction                               │
//! │                                                                         │
//! │  Vec<CartItem> ──► CartState::from_items() ──► { items, total, count } │
//! │                         │                                               │
//! │                         ├── drops lines with quantity < 1               │
//! │                         ├── merges duplicate product ids                │
//! │                         ├── count = |items|                             │
//! │                         └── total = Σ item_total                        │
//! │                                                                         │
//! │  There is no setter for `total` or `count`. The only way to get a      │
//! │  different total is to build a new CartState from different items.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{ProductRef, ProductSnapshot};
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Cart Item
// =============================================================================

/// One line of a cart.
///
/// ## Invariants
/// - `quantity >= 1`
/// - `item_total == unit_price × quantity` whenever `unit_price` is known;
///   otherwise `item_total` is whatever the shop API reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,

    /// Product data embedded by the shop API (authenticated mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSnapshot>,

    pub quantity: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,

    pub item_total: Money,
}

impl CartItem {
    /// A line whose unit price is known; the line total is derived.
    pub fn priced(product_id: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        CartItem {
            product_id: product_id.into(),
            product: None,
            quantity,
            unit_price: Some(unit_price),
            item_total: unit_price.saturating_multiply_quantity(quantity),
        }
    }

    /// A line without price information (guest cart filled by id only).
    pub fn unpriced(product_id: impl Into<String>, quantity: i64) -> Self {
        CartItem {
            product_id: product_id.into(),
            product: None,
            quantity,
            unit_price: None,
            item_total: Money::zero(),
        }
    }

    /// Builds a line from a shop API cart entry.
    ///
    /// The unit price comes from the entry's `price` field, falling back to
    /// the embedded product's price. When neither is present the
    /// server-supplied `item_total` is kept as-is.
    pub fn from_remote(
        product: ProductRef,
        quantity: i64,
        item_total: Money,
        price: Option<Money>,
    ) -> Self {
        let snapshot = product.snapshot().cloned();
        let unit_price = price.or_else(|| snapshot.as_ref().and_then(|p| p.price));
        let item_total = match unit_price {
            Some(unit) => unit.saturating_multiply_quantity(quantity),
            None => item_total,
        };

        CartItem {
            product_id: product.id().to_string(),
            product: snapshot,
            quantity,
            unit_price,
            item_total,
        }
    }

    /// Unit price used when the line's quantity changes locally.
    ///
    /// Falls back to `item_total / quantity` when the API did not report a
    /// unit price but the division is exact.
    pub fn effective_unit_price(&self) -> Option<Money> {
        if let Some(unit) = self.unit_price {
            return Some(unit);
        }
        if self.quantity > 0 && self.item_total.cents() % self.quantity == 0 {
            return Some(Money::from_cents(self.item_total.cents() / self.quantity));
        }
        None
    }

    /// Returns a copy of this line at a new quantity.
    ///
    /// The line total is recomputed from the last known unit price; without
    /// one it is left unchanged until the next authoritative reload.
    pub fn with_quantity(&self, quantity: i64) -> Self {
        let item_total = self
            .effective_unit_price()
            .map(|unit| unit.saturating_multiply_quantity(quantity))
            .unwrap_or(self.item_total);

        CartItem {
            quantity,
            item_total,
            ..self.clone()
        }
    }

    /// Merges another line for the same product into this one.
    fn absorb(&mut self, other: &CartItem) {
        let quantity = self.quantity.saturating_add(other.quantity);
        let merged = match self.effective_unit_price() {
            Some(_) => self.with_quantity(quantity),
            None => CartItem {
                quantity,
                item_total: self.item_total + other.item_total,
                ..self.clone()
            },
        };
        *self = merged;
    }
}

// =============================================================================
// Cart State
// =============================================================================

/// A reconciled cart: ordered lines plus their aggregates.
///
/// ## Invariants
/// - At most one line per `product_id`
/// - `count == items.len()`
/// - `total == Σ item_total`
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
    items: Vec<CartItem>,
    total: Money,
    count: usize,
}

impl CartState {
    /// An empty cart.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a cart from lines, enforcing the cart invariants.
    ///
    /// Lines keep their first-seen order. Later lines for an already-seen
    /// product are merged into the first one; lines with quantity < 1 are
    /// dropped.
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut merged: Vec<CartItem> = Vec::new();

        for item in items {
            if item.quantity < 1 {
                continue;
            }
            match merged.iter_mut().find(|i| i.product_id == item.product_id) {
                Some(existing) => existing.absorb(&item),
                None => merged.push(item),
            }
        }

        let total = merged.iter().map(|i| i.item_total).sum();
        let count = merged.len();

        CartState {
            items: merged,
            total,
            count,
        }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Sum of all line totals.
    pub fn total(&self) -> Money {
        self.total
    }

    /// Number of distinct lines.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Sum of all line quantities.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up the line for a product.
    pub fn get(&self, product_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.get(product_id).is_some()
    }

    /// Returns a new cart with one line's quantity replaced.
    ///
    /// This is the tentative patch of an optimistic quantity update.
    ///
    /// ## Errors
    /// - `ItemNotFound` if the product has no line in this cart
    /// - `QuantityTooLarge` above `MAX_ITEM_QUANTITY`
    pub fn with_quantity(&self, product_id: &str, quantity: i64) -> CoreResult<CartState> {
        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }
        if !self.contains(product_id) {
            return Err(CoreError::ItemNotFound(product_id.to_string()));
        }

        let items = self.items.iter().map(|item| {
            if item.product_id == product_id {
                item.with_quantity(quantity)
            } else {
                item.clone()
            }
        });

        Ok(CartState::from_items(items))
    }

    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    /// Returns true if the aggregates match the lines.
    pub fn is_consistent(&self) -> bool {
        let total: Money = self.items.iter().map(|i| i.item_total).sum();
        self.count == self.items.len() && self.total == total
    }
}

// =============================================================================
// Cart Totals
// =============================================================================

/// Cart totals summary for badges and order summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub total: Money,
}

impl From<&CartState> for CartTotals {
    fn from(cart: &CartState) -> Self {
        CartTotals {
            item_count: cart.count(),
            total_quantity: cart.total_quantity(),
            total: cart.total(),
        }
    }
}
