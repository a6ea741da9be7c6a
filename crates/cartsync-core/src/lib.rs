//! # cartsync-core: Pure Cart/Wishlist Model
//!
//! Everything the sync engine needs to reason about a cart or a wishlist,
//! expressed as plain data and pure functions. No storage, no network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        cartsync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Subscribers (storefront UI)                      │   │
//! │  │    Product card ──► Cart drawer ──► Wishlist page              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                cartsync-engine (SyncEngine)                     │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼───────────────┐   ┌──────────────▼───────────────┐   │
//! │  │  cartsync-store (GuestStore) │   │  RemoteStore (shop API)      │   │
//! │  └──────────────┬───────────────┘   └──────────────────────────────┘   │
//! │                 │                                                       │
//! │  ┌──────────────▼──────────────────────────────────────────────────┐   │
//! │  │               ★ cartsync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   money   │  │   types   │  │   cart    │  │ validation│  │   │
//! │  │   │   Money   │  │ ProductRef│  │ CartItem  │  │ quantity  │  │   │
//! │  │   │           │  │   Mode    │  │ CartState │  │ product id│  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORAGE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`types`] - Product references, wishlist entries, session mode
//! - [`cart`] - Cart items and the derived cart aggregates
//! - [`validation`] - Input rules shared by every backend
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use cartsync_core::{CartItem, CartState, Money};
//!
//! let items = vec![
//!     CartItem::priced("sku-1", 2, Money::from_cents(499)),
//!     CartItem::priced("sku-2", 1, Money::from_cents(1250)),
//! ];
//! let cart = CartState::from_items(items);
//!
//! assert_eq!(cart.count(), 2);
//! assert_eq!(cart.total().cents(), 2248);
//! ```

pub mod cart;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

pub use cart::{CartItem, CartState, CartTotals};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::{wishlist_contains, Mode, ProductRef, ProductSnapshot, WishlistEntry};

/// Maximum quantity of a single cart line.
///
/// Guards against typos like 1000 instead of 10 before anything reaches
/// local storage or the shop API.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Quantity used by `add_item` when the caller does not pass one.
pub const DEFAULT_ADD_QUANTITY: i64 = 1;
