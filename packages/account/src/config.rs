//! # Client configuration
//!
//! [`ClientConfig`] is everything the client needs to reach the account surface
//! and to scope its local session cache. It can be built in code
//! ([`ClientConfig::new`] plus the `with_*` builders) or parsed from TOML:
//!
//! ```toml
//! baseurl = "https://account.example.com"
//! app = "notes"                # alias of app_id
//! session = "__r_s_sess_"      # alias of session_key
//! timeout_ms = 50000           # optional
//! cookie_enabled = false       # optional
//! ```
//!
//! ## Invariants
//!
//! - `baseurl`, `app_id` and `session_key` are non-empty; [`ClientConfig::validate`]
//!   names the first missing one.
//! - `baseurl` carries no trailing slash. It is compared verbatim against the
//!   origin of every inbound message, so `https://a.com/` and `https://a.com`
//!   must not differ.
//! - `timeout_ms` of `0` means "use the default" ([`DEFAULT_TIMEOUT_MS`]).
//!
//! After construction the config only changes through [`ClientConfig::apply`]
//! with a [`ConfigPatch`]; a patch that would break an invariant is rejected
//! and leaves the config untouched.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Watchdog deadline used when none is configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 50_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Connection and cache settings for an [`crate::AccountClient`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Origin of the account surface, e.g. `https://account.example.com`.
    #[serde(default)]
    pub baseurl: String,
    /// Application id sent with every form request.
    #[serde(default, alias = "app")]
    pub app_id: String,
    /// Storage key the session is cached under.
    #[serde(default, alias = "session")]
    pub session_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Reserved for cookie-based sessions; carried but not acted on.
    #[serde(default)]
    pub cookie_enabled: bool,
}

impl ClientConfig {
    /// Create a validated config with default timeout and cookies disabled.
    pub fn new(
        baseurl: impl Into<String>,
        app_id: impl Into<String>,
        session_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self {
            baseurl: baseurl.into(),
            app_id: app_id.into(),
            session_key: session_key.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cookie_enabled: false,
        };
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Builder method to set the watchdog deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self.normalize();
        self
    }

    /// Builder method to set the cookie flag.
    pub fn with_cookie(mut self, enabled: bool) -> Self {
        self.cookie_enabled = enabled;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(s).map_err(|e| ConfigError::Toml(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baseurl.is_empty() {
            return Err(ConfigError::Missing("baseurl"));
        }
        if self.app_id.is_empty() {
            return Err(ConfigError::Missing("app_id"));
        }
        if self.session_key.is_empty() {
            return Err(ConfigError::Missing("session_key"));
        }
        Ok(())
    }

    pub(crate) fn normalize(&mut self) {
        let trimmed = self.baseurl.trim().trim_end_matches('/');
        if trimmed.len() != self.baseurl.len() {
            self.baseurl = trimmed.to_string();
        }
        if self.timeout_ms == 0 {
            self.timeout_ms = DEFAULT_TIMEOUT_MS;
        }
    }

    /// Apply a patch. On error the config is left as it was.
    pub fn apply(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        let mut next = self.clone();
        if let Some(baseurl) = patch.baseurl {
            next.baseurl = baseurl;
        }
        if let Some(app_id) = patch.app_id {
            next.app_id = app_id;
        }
        if let Some(session_key) = patch.session_key {
            next.session_key = session_key;
        }
        if let Some(timeout_ms) = patch.timeout_ms {
            next.timeout_ms = timeout_ms;
        }
        if let Some(cookie_enabled) = patch.cookie_enabled {
            next.cookie_enabled = cookie_enabled;
        }
        next.normalize();
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Partial update for [`ClientConfig`]. Unset fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub baseurl: Option<String>,
    #[serde(default, alias = "app")]
    pub app_id: Option<String>,
    #[serde(default, alias = "session")]
    pub session_key: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub cookie_enabled: Option<bool>,
}

impl ConfigPatch {
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn baseurl(mut self, baseurl: impl Into<String>) -> Self {
        self.baseurl = Some(baseurl.into());
        self
    }

    pub fn session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn cookie_enabled(mut self, enabled: bool) -> Self {
        self.cookie_enabled = Some(enabled);
        self
    }
}
