//! # Engine Error Types
//!
//! What subscribers see when an engine operation fails.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Remote        │  │     Cart rules          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RemoteFailure  │  │  ItemNotFound           │ │
//! │  │  InvalidUrl     │  │  (status, I/O,  │  │  Validation             │ │
//! │  │  ConfigLoad/Save│  │   timeout, body)│  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │  Local storage  │   Corrupted guest slots never surface here:      │
//! │  │                 │   GuestStore recovers them as empty.             │
//! │  │  Storage        │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use cartsync_core::{CoreError, ValidationError};
use cartsync_store::StoreError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The shop API rejected or never answered a call.
    ///
    /// Covers non-2xx statuses, transport errors, timeouts and bodies that do
    /// not decode. Never retried.
    #[error("Remote {operation} failed: {reason}")]
    RemoteFailure { operation: String, reason: String },

    // =========================================================================
    // Cart Rule Errors
    // =========================================================================
    /// The product has no line in the current cart.
    #[error("Product {0} is not in the cart")]
    ItemNotFound(String),

    /// Input was rejected before any backend call.
    #[error("Validation failed: {0}")]
    Validation(String),

    // =========================================================================
    // Local Storage Errors
    // =========================================================================
    #[error("Local storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Builds a `RemoteFailure` for the named API operation.
    pub fn remote(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::RemoteFailure {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the shop API failed.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, EngineError::RemoteFailure { .. })
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::InvalidUrl(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the call was rejected before reaching a backend.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ItemNotFound(id) => EngineError::ItemNotFound(id),
            other => EngineError::Validation(other.to_string()),
        }
    }
}

impl From<url::ParseError> for EngineError {
    fn from(err: url::ParseError) -> Self {
        EngineError::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}
