//! # cartsync-store: Guest Persistence
//!
//! Local storage for unauthenticated sessions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Guest Data Flow                                  │
//! │                                                                         │
//! │  SyncEngine (guest mode)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  cartsync-store (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────────────┐        ┌──────────────────────────┐ │   │
//! │  │   │     GuestStore       │        │     LocalStore           │ │   │
//! │  │   │     (guest.rs)       │        │     (local.rs)           │ │   │
//! │  │   │                      │        │                          │ │   │
//! │  │   │ guestCart  slot      │───────►│ FileStore   (JSON files) │ │   │
//! │  │   │ guestWishlist slot   │        │ MemoryStore (tests)      │ │   │
//! │  │   │ corrupt → empty      │        │                          │ │   │
//! │  │   └──────────────────────┘        └──────────────────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ~/.local/share/cartsync/guestCart.json                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`local`] - Synchronous key/value backends
//! - [`guest`] - The guest cart and wishlist slots
//! - [`error`] - Storage error types
//!
//! ## Usage
//!
//! ```rust
//! use cartsync_store::GuestStore;
//!
//! let store = GuestStore::in_memory();
//! store.update_wishlist(|ids| ids.push("p-1".to_string())).unwrap();
//! assert_eq!(store.read_wishlist(), vec!["p-1".to_string()]);
//! ```

pub mod error;
pub mod guest;
pub mod local;

pub use error::{StoreError, StoreResult};
pub use guest::{GuestCartLine, GuestStore, CART_KEY, WISHLIST_KEY};
pub use local::{FileStore, LocalStore, MemoryStore};
