//! # Sync Engine
//!
//! The single owner of published cart/wishlist state.
//!
//! ## Operation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     SyncEngine operation                                │
//! │                                                                         │
//! │  Subscriber ──► add_item / update_quantity / remove_item / ...         │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │               validate input  ──── rejected ──► Validation (no I/O)    │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │          capture active backend (epoch N)                               │
//! │                      │                                                  │
//! │         ┌────────────┴─────────────┐                                    │
//! │         │ update_quantity only:    │                                    │
//! │         │ tentative patch,         │                                    │
//! │         │ publish immediately      │                                    │
//! │         └────────────┬─────────────┘                                    │
//! │                      ▼                                                  │
//! │            backend mutation (awaits)          loading = true           │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │        reload collection (serialized)                                   │
//! │                      │                                                  │
//! │          epoch still N? ── no ──► discard (stale backend)              │
//! │                      │ yes                                              │
//! │                      ▼                                                  │
//! │     publish { cart, wishlist, aggregates, revision+1 }                 │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │        watch receivers + EngineListeners notified                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Mode Transitions
//! ```text
//!   Guest ──── set_auth(Authenticated) ────► Authenticated
//!     ▲        discard guest view,                │
//!     │        reload from shop API               │
//!     │                                           │
//!     └──────── set_auth(Anonymous) ◄─────────────┘
//!               reload from guest slots
//! ```
//!
//! The guest cart is not merged into the remote cart on sign-in; it stays in
//! the guest slots and reappears after sign-out.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use cartsync_core::validation::{validate_price_cents, validate_product_id, validate_quantity};
use cartsync_core::{
    wishlist_contains, CartState, CartTotals, CoreError, Mode, Money, WishlistEntry,
    DEFAULT_ADD_QUANTITY,
};
use cartsync_store::{FileStore, GuestStore};

use crate::backend::{AuthSignal, CartBackend, GuestBackend, RemoteBackend};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineListener, ListenerRegistry, SubscriptionId};
use crate::remote::{HttpConnector, RemoteConnector};

// =============================================================================
// Engine Snapshot
// =============================================================================

/// An immutable view of engine state, as handed to subscribers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub mode: Mode,
    pub cart: CartState,
    pub wishlist: Vec<WishlistEntry>,
    /// True while any backend call is in flight.
    pub loading: bool,
    /// Bumped on every publish.
    pub revision: u64,
    /// When cart or wishlist was last confirmed by a backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl EngineSnapshot {
    pub fn cart_total(&self) -> Money {
        self.cart.total()
    }

    pub fn cart_count(&self) -> usize {
        self.cart.count()
    }

    pub fn wishlist_count(&self) -> usize {
        self.wishlist.len()
    }

    pub fn totals(&self) -> CartTotals {
        CartTotals::from(&self.cart)
    }

    /// True if the wishlist holds `product_id` in either representation.
    pub fn is_wishlisted(&self, product_id: &str) -> bool {
        wishlist_contains(&self.wishlist, product_id)
    }
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Clone)]
struct ActiveBackend {
    epoch: u64,
    backend: Arc<dyn CartBackend>,
}

#[derive(Default)]
struct EngineState {
    mode: Mode,
    /// Epoch of the backend this state belongs to.
    epoch: u64,
    /// Published cart; may carry an unconfirmed optimistic patch.
    cart: CartState,
    /// Last cart a backend confirmed.
    confirmed_cart: CartState,
    /// False until the current backend has delivered a cart.
    cart_loaded: bool,
    wishlist: Vec<WishlistEntry>,
    in_flight: usize,
    revision: u64,
    reconciled_at: Option<DateTime<Utc>>,
}

impl EngineState {
    fn to_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            mode: self.mode,
            cart: self.cart.clone(),
            wishlist: self.wishlist.clone(),
            loading: self.in_flight > 0,
            revision: self.revision,
            reconciled_at: self.reconciled_at,
        }
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Cart/wishlist synchronization engine.
///
/// Construct one per session and share it as `Arc<SyncEngine>`.
pub struct SyncEngine {
    guest: GuestStore,
    connector: Arc<dyn RemoteConnector>,

    /// Active backend; swapped on `set_auth`.
    backend: RwLock<ActiveBackend>,

    state: RwLock<EngineState>,

    cart_reload: Mutex<()>,
    wishlist_reload: Mutex<()>,

    publisher: watch::Sender<EngineSnapshot>,
    listeners: ListenerRegistry,
}

impl SyncEngine {
    /// Creates an engine in the mode selected by `signal`.
    ///
    /// In guest mode the first snapshot already holds the guest slots. In
    /// authenticated mode nothing is fetched until [`refresh`](Self::refresh)
    /// or the first quantity update.
    pub fn new(
        guest: GuestStore,
        connector: Arc<dyn RemoteConnector>,
        signal: AuthSignal,
    ) -> EngineResult<Self> {
        let backend = Self::backend_for(&guest, connector.as_ref(), &signal)?;
        let mode = backend.mode();

        let mut state = EngineState {
            mode,
            ..Default::default()
        };
        if mode == Mode::Guest {
            let local = GuestBackend::new(guest.clone());
            state.cart = local.cart();
            state.confirmed_cart = state.cart.clone();
            state.wishlist = local.wishlist();
            state.cart_loaded = true;
            state.reconciled_at = Some(Utc::now());
        }
        let (publisher, _) = watch::channel(state.to_snapshot());

        info!(
            mode = %mode,
            items = state.cart.count(),
            wishlist = state.wishlist.len(),
            "Sync engine created"
        );

        Ok(SyncEngine {
            guest,
            connector,
            backend: RwLock::new(ActiveBackend { epoch: 0, backend }),
            state: RwLock::new(state),
            cart_reload: Mutex::new(()),
            wishlist_reload: Mutex::new(()),
            publisher,
            listeners: ListenerRegistry::default(),
        })
    }

    /// Creates an engine with file-backed guest storage and the HTTP shop
    /// API client described by `config`.
    pub fn from_config(config: &EngineConfig, signal: AuthSignal) -> EngineResult<Self> {
        config.validate()?;

        let data_dir = config.storage.resolved_data_dir()?;
        debug!(data_dir = %data_dir.display(), "Opening guest storage");
        let guest = GuestStore::new(Arc::new(FileStore::new(data_dir)));
        let connector = Arc::new(HttpConnector::new(config.remote.clone()));

        Self::new(guest, connector, signal)
    }

    fn backend_for(
        guest: &GuestStore,
        connector: &dyn RemoteConnector,
        signal: &AuthSignal,
    ) -> EngineResult<Arc<dyn CartBackend>> {
        let backend: Arc<dyn CartBackend> = match signal {
            AuthSignal::Anonymous => Arc::new(GuestBackend::new(guest.clone())),
            AuthSignal::Authenticated { token } => {
                Arc::new(RemoteBackend::new(connector.connect(token)?))
            }
        };
        Ok(backend)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The latest published snapshot.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.publisher.borrow().clone()
    }

    pub fn mode(&self) -> Mode {
        self.publisher.borrow().mode
    }

    pub fn is_wishlisted(&self, product_id: &str) -> bool {
        self.publisher.borrow().is_wishlisted(product_id)
    }

    /// A receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<EngineSnapshot> {
        self.publisher.subscribe()
    }

    pub fn subscribe(&self, listener: Arc<dyn EngineListener>) -> SubscriptionId {
        let id = self.listeners.subscribe(listener);
        debug!(subscription = %id, "Listener subscribed");
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.listeners.unsubscribe(id);
        debug!(subscription = %id, removed, "Listener unsubscribed");
        removed
    }

    // =========================================================================
    // Cart Operations
    // =========================================================================

    /// Adds one unit of a product.
    pub async fn add_item(&self, product_id: &str) -> EngineResult<()> {
        self.add_item_quantity(product_id, DEFAULT_ADD_QUANTITY)
            .await
    }

    /// Adds `quantity` units of a product.
    ///
    /// Guest: an existing line's quantity is incremented. Authenticated: the
    /// shop API decides, and the cart is reloaded. On failure nothing changes.
    pub async fn add_item_quantity(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        let result = self.add(product_id, quantity, None).await;
        self.report("add_item", result)
    }

    /// Like [`add_item_quantity`](Self::add_item_quantity), also recording the
    /// unit price for guest carts.
    pub async fn add_item_priced(
        &self,
        product_id: &str,
        quantity: i64,
        unit_price: Money,
    ) -> EngineResult<()> {
        let result = self.add(product_id, quantity, Some(unit_price)).await;
        self.report("add_item", result)
    }

    async fn add(
        &self,
        product_id: &str,
        quantity: i64,
        unit_price: Option<Money>,
    ) -> EngineResult<()> {
        validate_product_id(product_id)?;
        validate_quantity(quantity)?;
        if let Some(price) = unit_price {
            validate_price_cents(price.cents())?;
        }

        let active = self.active().await;
        self.tracked(async {
            active
                .backend
                .add_item(product_id, quantity, unit_price)
                .await?;
            debug!(product_id, quantity, mode = %active.backend.mode(), "Item added");
            self.reload_cart(&active).await
        })
        .await
    }

    /// Sets a line's quantity, optimistically.
    ///
    /// ## Rules
    /// - `quantity < 1` is a silent no-op
    /// - A product not in the cart is logged and ignored; if this backend has
    ///   not delivered a cart yet, it is loaded first
    /// - A backend swapped out in the meantime gets no update
    /// - The patched line is published before the backend call; the reload
    ///   afterwards replaces it with confirmed state, success or not
    pub async fn update_quantity(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        let result = self.update(product_id, quantity).await;
        self.report("update_quantity", result)
    }

    async fn update(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        if quantity < 1 {
            debug!(product_id, quantity, "Ignoring quantity below 1");
            return Ok(());
        }
        validate_product_id(product_id)?;
        validate_quantity(quantity)?;

        let active = self.active().await;
        self.tracked(async {
            // The not-found check needs a cart from this backend.
            let loaded = self.state.read().await.cart_loaded;
            if !loaded {
                self.reload_cart(&active).await?;
            }

            // Phase 1: tentative patch.
            {
                let mut state = self.state.write().await;
                if state.epoch != active.epoch {
                    warn!(
                        product_id,
                        epoch = active.epoch,
                        current = state.epoch,
                        "Backend swapped before quantity update, ignoring"
                    );
                    return Ok(());
                }
                match state.cart.with_quantity(product_id, quantity) {
                    Ok(patched) => {
                        state.cart = patched;
                        self.publish(&mut state);
                    }
                    Err(CoreError::ItemNotFound(_)) => {
                        warn!(product_id, quantity, "Quantity update for item not in cart ignored");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            // Phase 2: backend.
            let outcome = match active.backend.update_quantity(product_id, quantity).await {
                Err(EngineError::ItemNotFound(id)) => {
                    warn!(product_id = %id, "Item vanished before quantity update, ignoring");
                    Ok(())
                }
                other => other,
            };

            // Phase 3: reconcile.
            match self.reload_cart(&active).await {
                Ok(()) => outcome,
                Err(reload_err) => {
                    error!(
                        product_id,
                        error = %reload_err,
                        "Cart reconciliation failed, restoring last confirmed cart"
                    );
                    self.restore_confirmed_cart(active.epoch).await;
                    outcome.and(Err(reload_err))
                }
            }
        })
        .await
    }

    /// Removes a product's line. Removing an absent product is not an error.
    pub async fn remove_item(&self, product_id: &str) -> EngineResult<()> {
        let result = self.remove(product_id).await;
        self.report("remove_item", result)
    }

    async fn remove(&self, product_id: &str) -> EngineResult<()> {
        validate_product_id(product_id)?;

        let active = self.active().await;
        self.tracked(async {
            active.backend.remove_item(product_id).await?;
            debug!(product_id, "Item removed");
            self.reload_cart(&active).await
        })
        .await
    }

    /// Empties the cart. Clearing an empty cart is not an error.
    pub async fn clear_cart(&self) -> EngineResult<()> {
        let result = self.clear().await;
        self.report("clear_cart", result)
    }

    async fn clear(&self) -> EngineResult<()> {
        let active = self.active().await;
        self.tracked(async {
            active.backend.clear_cart().await?;
            debug!(mode = %active.backend.mode(), "Cart cleared");
            self.reload_cart(&active).await
        })
        .await
    }

    // =========================================================================
    // Wishlist Operations
    // =========================================================================

    pub async fn add_wishlist(&self, product_id: &str) -> EngineResult<()> {
        let result = self.wishlist_add(product_id).await;
        self.report("add_wishlist", result)
    }

    async fn wishlist_add(&self, product_id: &str) -> EngineResult<()> {
        validate_product_id(product_id)?;

        let active = self.active().await;
        self.tracked(async {
            active.backend.add_wishlist(product_id).await?;
            debug!(product_id, "Wishlist entry added");
            self.reload_wishlist(&active).await
        })
        .await
    }

    pub async fn remove_wishlist(&self, product_id: &str) -> EngineResult<()> {
        let result = self.wishlist_remove(product_id).await;
        self.report("remove_wishlist", result)
    }

    async fn wishlist_remove(&self, product_id: &str) -> EngineResult<()> {
        validate_product_id(product_id)?;

        let active = self.active().await;
        self.tracked(async {
            active.backend.remove_wishlist(product_id).await?;
            debug!(product_id, "Wishlist entry removed");
            self.reload_wishlist(&active).await
        })
        .await
    }

    // =========================================================================
    // Reloads
    // =========================================================================

    /// Reloads the cart from the active backend.
    pub async fn refresh_cart(&self) -> EngineResult<()> {
        let active = self.active().await;
        let result = self.reload_cart(&active).await;
        self.report("refresh_cart", result)
    }

    /// Reloads the wishlist from the active backend.
    pub async fn refresh_wishlist(&self) -> EngineResult<()> {
        let active = self.active().await;
        let result = self.reload_wishlist(&active).await;
        self.report("refresh_wishlist", result)
    }

    /// Reloads cart and wishlist concurrently.
    pub async fn refresh(&self) -> EngineResult<()> {
        let active = self.active().await;
        let result = self.reload_all(&active).await;
        self.report("refresh", result)
    }

    async fn reload_all(&self, active: &ActiveBackend) -> EngineResult<()> {
        let (cart, wishlist) = tokio::join!(self.reload_cart(active), self.reload_wishlist(active));
        cart.and(wishlist)
    }

    async fn reload_cart(&self, active: &ActiveBackend) -> EngineResult<()> {
        let _serialized = self.cart_reload.lock().await;
        let cart = self.tracked(active.backend.load_cart()).await?;

        let mut state = self.state.write().await;
        if state.epoch != active.epoch {
            warn!(
                epoch = active.epoch,
                current = state.epoch,
                "Discarding cart from swapped-out backend"
            );
            return Ok(());
        }

        debug!(
            items = cart.count(),
            total = %cart.total(),
            mode = %state.mode,
            "Cart reconciled"
        );
        state.confirmed_cart = cart.clone();
        state.cart = cart;
        state.cart_loaded = true;
        state.reconciled_at = Some(Utc::now());
        self.publish(&mut state);
        Ok(())
    }

    async fn reload_wishlist(&self, active: &ActiveBackend) -> EngineResult<()> {
        let _serialized = self.wishlist_reload.lock().await;
        let wishlist = self.tracked(active.backend.load_wishlist()).await?;

        let mut state = self.state.write().await;
        if state.epoch != active.epoch {
            warn!(
                epoch = active.epoch,
                current = state.epoch,
                "Discarding wishlist from swapped-out backend"
            );
            return Ok(());
        }

        debug!(entries = wishlist.len(), mode = %state.mode, "Wishlist reconciled");
        state.wishlist = wishlist;
        state.reconciled_at = Some(Utc::now());
        self.publish(&mut state);
        Ok(())
    }

    async fn restore_confirmed_cart(&self, epoch: u64) {
        let mut state = self.state.write().await;
        if state.epoch == epoch && state.cart != state.confirmed_cart {
            state.cart = state.confirmed_cart.clone();
            self.publish(&mut state);
        }
    }

    // =========================================================================
    // Mode Transitions
    // =========================================================================

    /// Applies a new authentication signal.
    ///
    /// Swaps the active backend, publishes an empty view in the new mode, then
    /// reloads both collections from the new backend. Results still in flight
    /// from the previous backend are discarded when they arrive.
    pub async fn set_auth(&self, signal: AuthSignal) -> EngineResult<()> {
        let result = self.switch_backend(signal).await;
        self.report("set_auth", result)
    }

    async fn switch_backend(&self, signal: AuthSignal) -> EngineResult<()> {
        let backend = Self::backend_for(&self.guest, self.connector.as_ref(), &signal)?;
        let mode = backend.mode();

        let active = {
            let mut slot = self.backend.write().await;
            slot.epoch += 1;
            slot.backend = backend;
            slot.clone()
        };

        {
            let mut state = self.state.write().await;
            if active.epoch > state.epoch {
                let previous = state.mode;
                state.mode = mode;
                state.epoch = active.epoch;
                state.cart = CartState::empty();
                state.confirmed_cart = CartState::empty();
                state.cart_loaded = false;
                state.wishlist = Vec::new();
                state.reconciled_at = None;
                self.publish(&mut state);
                info!(from = %previous, to = %mode, epoch = active.epoch, "Session mode changed");
            }
        }

        self.reload_all(&active).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn active(&self) -> ActiveBackend {
        self.backend.read().await.clone()
    }

    /// Runs `fut` with the in-flight counter raised.
    async fn tracked<T, F>(&self, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        {
            let mut state = self.state.write().await;
            state.in_flight += 1;
            if state.in_flight == 1 {
                self.publish(&mut state);
            }
        }

        let result = fut.await;

        {
            let mut state = self.state.write().await;
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.in_flight == 0 {
                self.publish(&mut state);
            }
        }

        result
    }

    fn publish(&self, state: &mut EngineState) {
        state.revision += 1;
        let snapshot = state.to_snapshot();
        self.publisher.send_replace(snapshot.clone());
        self.listeners.notify_change(&snapshot);
    }

    fn report<T>(&self, operation: &str, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(ref e) = result {
            warn!(operation, error = %e, "Engine operation failed");
            self.listeners.notify_error(operation, e);
        }
        result
    }
}
