//! # Cart Backends
//!
//! The two sources of truth a session can have, behind one trait.
//!
//! ## Backend Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      AuthSignal → CartBackend                           │
//! │                                                                         │
//! │  AuthSignal::Anonymous                AuthSignal::Authenticated{token}  │
//! │         │                                       │                       │
//! │         ▼                                       ▼                       │
//! │  ┌──────────────────┐                 ┌──────────────────────┐         │
//! │  │  GuestBackend    │                 │  RemoteBackend       │         │
//! │  │                  │                 │                      │         │
//! │  │  GuestStore      │                 │  RemoteStore         │         │
//! │  │  (sync, local)   │                 │  (async, shop API)   │         │
//! │  │                  │                 │                      │         │
//! │  │  add = merge qty │                 │  add = POST, server  │         │
//! │  │  locally         │                 │  decides the merge   │         │
//! │  └──────────────────┘                 └──────────────────────┘         │
//! │                                                                         │
//! │  The engine never branches on Mode inside an operation; it calls       │
//! │  whichever backend is active.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use cartsync_core::{
    CartState, CoreError, Mode, Money, ProductRef, WishlistEntry, MAX_ITEM_QUANTITY,
};
use cartsync_store::{GuestCartLine, GuestStore};

use crate::error::{EngineError, EngineResult};
use crate::remote::RemoteStore;

// =============================================================================
// Auth Signal
// =============================================================================

/// The external authentication signal that selects the session mode.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthSignal {
    #[default]
    Anonymous,
    Authenticated { token: String },
}

impl AuthSignal {
    pub fn authenticated(token: impl Into<String>) -> Self {
        AuthSignal::Authenticated {
            token: token.into(),
        }
    }

    /// Builds a signal from an optional bearer token.
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.trim().is_empty() => AuthSignal::Authenticated { token },
            _ => AuthSignal::Anonymous,
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            AuthSignal::Anonymous => Mode::Guest,
            AuthSignal::Authenticated { .. } => Mode::Authenticated,
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for AuthSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthSignal::Anonymous => write!(f, "Anonymous"),
            AuthSignal::Authenticated { .. } => write!(f, "Authenticated {{ token: <redacted> }}"),
        }
    }
}

// =============================================================================
// Backend Trait
// =============================================================================

/// One source of truth for cart and wishlist.
///
/// Mutations do not return state; the engine always reloads afterwards.
#[async_trait]
pub trait CartBackend: Send + Sync {
    fn mode(&self) -> Mode;

    async fn load_cart(&self) -> EngineResult<CartState>;

    async fn load_wishlist(&self) -> EngineResult<Vec<WishlistEntry>>;

    /// Adds `quantity` of a product. `unit_price` is only kept by backends
    /// that do not know prices themselves.
    async fn add_item(
        &self,
        product_id: &str,
        quantity: i64,
        unit_price: Option<Money>,
    ) -> EngineResult<()>;

    async fn update_quantity(&self, product_id: &str, quantity: i64) -> EngineResult<()>;

    async fn remove_item(&self, product_id: &str) -> EngineResult<()>;

    async fn clear_cart(&self) -> EngineResult<()>;

    async fn add_wishlist(&self, product_id: &str) -> EngineResult<()>;

    async fn remove_wishlist(&self, product_id: &str) -> EngineResult<()>;
}

// =============================================================================
// Guest Backend
// =============================================================================

/// Backend over the local guest slots.
#[derive(Debug, Clone)]
pub struct GuestBackend {
    store: GuestStore,
}

impl GuestBackend {
    pub fn new(store: GuestStore) -> Self {
        GuestBackend { store }
    }

    /// Reads the guest cart without going through the async trait.
    pub fn cart(&self) -> CartState {
        let lines = self.store.read_cart();
        CartState::from_items(lines.iter().map(GuestCartLine::to_cart_item))
    }

    pub fn wishlist(&self) -> Vec<WishlistEntry> {
        self.store
            .read_wishlist()
            .into_iter()
            .map(ProductRef::Id)
            .collect()
    }
}

#[async_trait]
impl CartBackend for GuestBackend {
    fn mode(&self) -> Mode {
        Mode::Guest
    }

    async fn load_cart(&self) -> EngineResult<CartState> {
        Ok(self.cart())
    }

    async fn load_wishlist(&self) -> EngineResult<Vec<WishlistEntry>> {
        Ok(self.wishlist())
    }

    async fn add_item(
        &self,
        product_id: &str,
        quantity: i64,
        unit_price: Option<Money>,
    ) -> EngineResult<()> {
        let existing = self
            .store
            .read_cart()
            .iter()
            .find(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .unwrap_or(0);

        let merged = existing.saturating_add(quantity);
        if merged > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: merged,
                max: MAX_ITEM_QUANTITY,
            }
            .into());
        }

        self.store.update_cart(|lines| {
            match lines.iter_mut().find(|l| l.product_id == product_id) {
                Some(line) => {
                    line.quantity = merged;
                    if unit_price.is_some() {
                        line.unit_price = unit_price;
                    }
                }
                None => lines.push(
                    GuestCartLine::new(product_id, quantity).with_unit_price(unit_price),
                ),
            }
        })?;

        debug!(product_id, quantity = merged, "Guest cart line added");
        Ok(())
    }

    async fn update_quantity(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        let mut found = false;
        self.store.update_cart(|lines| {
            if let Some(line) = lines.iter_mut().find(|l| l.product_id == product_id) {
                line.quantity = quantity;
                found = true;
            }
        })?;

        if found {
            Ok(())
        } else {
            Err(EngineError::ItemNotFound(product_id.to_string()))
        }
    }

    async fn remove_item(&self, product_id: &str) -> EngineResult<()> {
        self.store
            .update_cart(|lines| lines.retain(|l| l.product_id != product_id))?;
        Ok(())
    }

    async fn clear_cart(&self) -> EngineResult<()> {
        self.store.clear_cart()?;
        Ok(())
    }

    async fn add_wishlist(&self, product_id: &str) -> EngineResult<()> {
        self.store.update_wishlist(|ids| {
            if !ids.iter().any(|id| id == product_id) {
                ids.push(product_id.to_string());
            }
        })?;
        Ok(())
    }

    async fn remove_wishlist(&self, product_id: &str) -> EngineResult<()> {
        self.store
            .update_wishlist(|ids| ids.retain(|id| id != product_id))?;
        Ok(())
    }
}

// =============================================================================
// Remote Backend
// =============================================================================

/// Backend over the shop API.
#[derive(Clone)]
pub struct RemoteBackend {
    remote: Arc<dyn RemoteStore>,
}

impl RemoteBackend {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        RemoteBackend { remote }
    }
}

#[async_trait]
impl CartBackend for RemoteBackend {
    fn mode(&self) -> Mode {
        Mode::Authenticated
    }

    async fn load_cart(&self) -> EngineResult<CartState> {
        Ok(self.remote.fetch_cart().await?.into_cart_state())
    }

    async fn load_wishlist(&self) -> EngineResult<Vec<WishlistEntry>> {
        let mut entries = self.remote.fetch_wishlist().await?.wishlist;
        let mut seen: Vec<String> = Vec::with_capacity(entries.len());
        entries.retain(|entry| {
            let fresh = !seen.iter().any(|id| id == entry.id());
            if fresh {
                seen.push(entry.id().to_string());
            }
            fresh
        });
        Ok(entries)
    }

    async fn add_item(
        &self,
        product_id: &str,
        quantity: i64,
        _unit_price: Option<Money>,
    ) -> EngineResult<()> {
        self.remote.add_to_cart(product_id, quantity).await
    }

    async fn update_quantity(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        self.remote.update_cart_item(product_id, quantity).await
    }

    async fn remove_item(&self, product_id: &str) -> EngineResult<()> {
        self.remote.remove_from_cart(product_id).await
    }

    async fn clear_cart(&self) -> EngineResult<()> {
        self.remote.clear_cart().await
    }

    async fn add_wishlist(&self, product_id: &str) -> EngineResult<()> {
        self.remote.add_to_wishlist(product_id).await
    }

    async fn remove_wishlist(&self, product_id: &str) -> EngineResult<()> {
        self.remote.remove_from_wishlist(product_id).await
    }
}
