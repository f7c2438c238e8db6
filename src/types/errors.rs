use thiserror::Error;

use super::browser::TabId;

// === StoreError ===

/// Errors raised by a key/value store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("Store backend error: {0}")]
    Backend(String),
    /// A stored value could not be encoded or decoded.
    #[error("Store serialization error: {0}")]
    Serialization(String),
    /// The backend is not available at all.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

// === BrowserError ===

/// Errors raised by browser capability calls.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The host does not provide this capability.
    #[error("Browser capability unsupported: {0}")]
    Unsupported(String),
    /// The host rejected the call.
    #[error("Browser call failed: {0}")]
    Call(String),
    /// The tab does not exist (any more).
    #[error("Browser tab not found: {0}")]
    TabNotFound(TabId),
}

impl BrowserError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BrowserError::Unsupported(_))
    }
}

// === ConfigError ===

/// Errors related to loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(String),
    #[error("Config parse error: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

// === CoreError ===

/// Errors surfaced by the group/tab core and relayed to UI callers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown group or tab id on an operation that requires it to exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The tab's container does not match the target container group.
    #[error("Tab {tab_id} cannot be assigned to group {group_id}: container mismatch")]
    InvalidAssignment { tab_id: TabId, group_id: String },
    /// The durable store is missing; callers fall back to the primary store.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    /// An optional browser capability is missing.
    #[error("Browser API unavailable: {0}")]
    BrowserApiUnavailable(String),
    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The group repository has not been loaded from the store yet.
    #[error("Group repository not loaded")]
    NotLoaded,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Browser(BrowserError),
}

impl From<BrowserError> for CoreError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::Unsupported(what) => CoreError::BrowserApiUnavailable(what),
            BrowserError::TabNotFound(id) => CoreError::NotFound(format!("tab {}", id)),
            other => CoreError::Browser(other),
        }
    }
}
