//! # Guest Store
//!
//! The guest cart and wishlist, persisted in two named slots.
//!
//! ## Read/Modify/Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    update_cart(|lines| ...)                             │
//! │                                                                         │
//! │  read "guestCart" ──► parse ──► normalize ──► closure mutates lines    │
//! │        │                │                              │                │
//! │    missing?         corrupt?                           ▼                │
//! │        └──► []  ◄───────┘                   serialize whole array       │
//! │                                                         │               │
//! │                                                         ▼               │
//! │                                             write "guestCart" (atomic) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Normalization keeps the slot invariants even if the file was edited or
//! written by an older client: one line per product (first position kept,
//! quantities summed), no line with quantity < 1, no duplicate wishlist ids.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use cartsync_core::{CartItem, Money, ProductRef};

use crate::error::{StoreError, StoreResult};
use crate::local::{LocalStore, MemoryStore};

/// Slot holding the guest cart.
pub const CART_KEY: &str = "guestCart";

/// Slot holding the guest wishlist.
pub const WISHLIST_KEY: &str = "guestWishlist";

// =============================================================================
// Guest Cart Line
// =============================================================================

/// A persisted guest cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestCartLine {
    pub product_id: String,
    pub quantity: i64,
    /// Only present when the caller supplied a price when adding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
}

impl GuestCartLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        GuestCartLine {
            product_id: product_id.into(),
            quantity,
            unit_price: None,
        }
    }

    pub fn with_unit_price(mut self, unit_price: Option<Money>) -> Self {
        self.unit_price = unit_price;
        self
    }

    /// Converts to the engine's cart line.
    pub fn to_cart_item(&self) -> CartItem {
        match self.unit_price {
            Some(price) => CartItem::priced(&self.product_id, self.quantity, price),
            None => CartItem::unpriced(&self.product_id, self.quantity),
        }
    }
}

fn normalize_lines(lines: Vec<GuestCartLine>) -> Vec<GuestCartLine> {
    let mut out: Vec<GuestCartLine> = Vec::with_capacity(lines.len());

    for line in lines {
        if line.quantity < 1 {
            continue;
        }
        match out.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
                if existing.unit_price.is_none() {
                    existing.unit_price = line.unit_price;
                }
            }
            None => out.push(line),
        }
    }

    out
}

fn normalize_ids(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !id.is_empty() && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

// =============================================================================
// Guest Store
// =============================================================================

/// Guest cart and wishlist persistence.
///
/// Cheap to clone; clones share the same backing store.
#[derive(Debug, Clone)]
pub struct GuestStore {
    store: Arc<dyn LocalStore>,
}

impl GuestStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        GuestStore { store }
    }

    /// A guest store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Reads a slot as a JSON array of `T`.
    ///
    /// A missing slot, unreadable file or non-array content yields an empty
    /// list. Individual elements that fail to decode are skipped.
    fn read_array<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key, error = %e, "Failed to read guest slot, treating as empty");
                return Vec::new();
            }
        };

        let elements = match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(elements) => elements,
            Err(e) => {
                let err = StoreError::Corrupted {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Recovered corrupted guest slot as empty");
                return Vec::new();
            }
        };

        let total = elements.len();
        let decoded: Vec<T> = elements
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();

        if decoded.len() != total {
            warn!(
                key,
                skipped = total - decoded.len(),
                "Skipped undecodable entries in guest slot"
            );
        }

        decoded
    }

    fn write_array<T: Serialize>(&self, key: &str, values: &[T]) -> StoreResult<()> {
        let raw = serde_json::to_string(values).map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, &raw)
    }

    // =========================================================================
    // Cart Slot
    // =========================================================================

    /// Reads the guest cart, normalized.
    pub fn read_cart(&self) -> Vec<GuestCartLine> {
        normalize_lines(self.read_array(CART_KEY))
    }

    /// Replaces the guest cart.
    pub fn write_cart(&self, lines: &[GuestCartLine]) -> StoreResult<()> {
        let lines = normalize_lines(lines.to_vec());
        self.write_array(CART_KEY, &lines)?;
        debug!(lines = lines.len(), "Guest cart persisted");
        Ok(())
    }

    /// Read/modify/write over the guest cart.
    ///
    /// Returns the persisted lines. Nothing is written if the closure's
    /// result serializes identically to what was read.
    pub fn update_cart<F>(&self, f: F) -> StoreResult<Vec<GuestCartLine>>
    where
        F: FnOnce(&mut Vec<GuestCartLine>),
    {
        let before = self.read_cart();
        let mut lines = before.clone();
        f(&mut lines);
        let lines = normalize_lines(lines);

        if lines != before {
            self.write_array(CART_KEY, &lines)?;
            debug!(lines = lines.len(), "Guest cart persisted");
        }
        Ok(lines)
    }

    /// Empties the guest cart by deleting its slot; a missing slot reads as
    /// an empty cart.
    pub fn clear_cart(&self) -> StoreResult<()> {
        self.store.remove(CART_KEY)?;
        debug!("Guest cart cleared");
        Ok(())
    }

    // =========================================================================
    // Wishlist Slot
    // =========================================================================

    /// Reads the guest wishlist as product ids.
    ///
    /// Entries written as embedded products (`{"_id": ...}`) are accepted and
    /// reduced to their id.
    pub fn read_wishlist(&self) -> Vec<String> {
        let entries: Vec<ProductRef> = self.read_array(WISHLIST_KEY);
        normalize_ids(entries.into_iter().map(|e| e.id().to_string()).collect())
    }

    /// Replaces the guest wishlist.
    pub fn write_wishlist(&self, ids: &[String]) -> StoreResult<()> {
        let ids = normalize_ids(ids.to_vec());
        self.write_array(WISHLIST_KEY, &ids)
    }

    /// Read/modify/write over the guest wishlist.
    pub fn update_wishlist<F>(&self, f: F) -> StoreResult<Vec<String>>
    where
        F: FnOnce(&mut Vec<String>),
    {
        let before = self.read_wishlist();
        let mut ids = before.clone();
        f(&mut ids);
        let ids = normalize_ids(ids);

        if ids != before {
            self.write_array(WISHLIST_KEY, &ids)?;
            debug!(entries = ids.len(), "Guest wishlist persisted");
        }
        Ok(ids)
    }
}
