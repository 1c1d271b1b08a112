use std::time::Duration;

use store::StoreError;
use thiserror::Error;

use crate::protocol::{DonePayload, Flow};

/// Invalid client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing prop: {0}")]
    Missing(&'static str),

    #[error("invalid config file: {0}")]
    Toml(String),
}

/// Every way an account operation can fail to produce its value.
///
/// [`AuthError::Cancelled`] is not a failure: the user dismissed the surface.
/// Check [`AuthError::is_cancelled`] before reporting anything to the user.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} was cancelled by the user")]
    Cancelled(Flow),

    /// The surface answered with a status or shape the flow does not know.
    #[error("server misconfiguration error: unexpected response to {flow} (status {status})")]
    ServerMisconfigured { flow: Flow, status: u16 },

    #[error("request timeout: no answer from the account surface within {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The surface refused the request; the raw payload is kept for the host.
    #[error("{flow} rejected with status {}", .payload.status)]
    Rejected { flow: Flow, payload: DonePayload },

    #[error("need to sign in before {0}")]
    NotSignedIn(Flow),

    #[error("could not open the account surface: {0}")]
    Surface(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("account client dropped before the request settled")]
    Dropped,
}

impl AuthError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuthError::Cancelled(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AuthError::Timeout(_))
    }

    /// True when the host has no usable persistence.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, AuthError::Storage(e) if e.is_unavailable())
    }
}
