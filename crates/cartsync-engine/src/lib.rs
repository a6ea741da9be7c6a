//! # cartsync: Cart/Wishlist Sync Engine
//!
//! One view of "the current cart" and "the current wishlist", whichever
//! store is authoritative for the session.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        cartsync-engine                                  │
//! │                                                                         │
//! │  Subscribers ──► SyncEngine ──► Arc<dyn CartBackend>                   │
//! │      ▲              │                 │                                 │
//! │      │              │        ┌────────┴─────────┐                       │
//! │      │              │        ▼                  ▼                       │
//! │      │              │   GuestBackend       RemoteBackend                │
//! │      │              │   (GuestStore)       (RemoteStore)                │
//! │      │              │        │                  │                       │
//! │      │              │   guestCart.json     GET/POST/PUT/DELETE          │
//! │      │              │   guestWishlist.json /cart, /wishlist             │
//! │      │              ▼                                                   │
//! │      └──── EngineSnapshot (watch channel + EngineListener callbacks)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`engine`] - SyncEngine and published snapshots
//! - [`backend`] - AuthSignal, CartBackend, guest and remote backends
//! - [`remote`] - RemoteStore trait and the HTTP client
//! - [`events`] - Listener callbacks and subscription handles
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cartsync::{AuthSignal, EngineConfig, SyncEngine};
//!
//! let config = EngineConfig::load_or_default(None);
//! let engine = Arc::new(SyncEngine::from_config(&config, AuthSignal::Anonymous)?);
//! engine.refresh().await?;
//!
//! engine.add_item("64f1c0ffee").await?;
//! println!("{} items, {}", engine.snapshot().cart_count(), engine.snapshot().cart_total());
//!
//! // Customer signs in: the shop API becomes authoritative.
//! engine.set_auth(AuthSignal::authenticated(token)).await?;
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod remote;

pub use backend::{AuthSignal, CartBackend, GuestBackend, RemoteBackend};
pub use config::{EngineConfig, RemoteSettings, StorageSettings};
pub use engine::{EngineSnapshot, SyncEngine};
pub use error::{EngineError, EngineResult};
pub use events::{EngineListener, NoOpListener, SubscriptionId};
pub use remote::{
    CartResponse, HttpConnector, HttpRemoteStore, RemoteCartLine, RemoteConnector, RemoteStore,
    WishlistResponse,
};
