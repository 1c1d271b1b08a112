use thiserror::Error;

/// Failures surfaced by the session cache.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The host environment has no persistence capability.
    #[error("session storage is unavailable in this environment")]
    Unavailable,

    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A platform storage call failed (e.g. quota exceeded in the browser).
    #[error("session storage backend failed: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable)
    }
}
