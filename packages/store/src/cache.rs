//! # Local session cache
//!
//! [`LocalCache`] persists a single [`Session`] under one configured key. All
//! storage goes through the [`SessionStore`] trait, so the same cache works
//! against an in-memory map (tests, headless hosts), a directory on disk
//! (desktop) or the browser's `localStorage` (web).
//!
//! ## Capability probe
//!
//! Whether the host can persist anything at all is decided once, when the cache
//! is built: [`LocalCache::new`] takes `Option<Box<dyn SessionStore>>`, and a
//! cache built without a backend answers every call with
//! [`StoreError::Unavailable`]. Callers never re-check the environment
//! themselves.
//!
//! ## Reads
//!
//! An absent key means "no session". A present but unreadable blob (corrupt
//! JSON, missing `user` or `token`) is also reported as "no session" after a
//! warning, since the only sensible recovery is to authenticate again.

use tracing::warn;

use crate::error::StoreError;
use crate::models::Session;

/// Synchronous key/value backend for the session cache.
pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A session record scoped to a single storage key.
pub struct LocalCache {
    key: String,
    backend: Option<Box<dyn SessionStore>>,
}

impl LocalCache {
    pub fn new(key: impl Into<String>, backend: Option<Box<dyn SessionStore>>) -> Self {
        Self {
            key: key.into(),
            backend,
        }
    }

    /// A cache for an environment without persistence.
    pub fn unavailable(key: impl Into<String>) -> Self {
        Self::new(key, None)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Re-scope the cache to another key. Data under the old key is left alone.
    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&dyn SessionStore, StoreError> {
        self.backend.as_deref().ok_or(StoreError::Unavailable)
    }

    /// The raw blob stored under the key, if any.
    pub fn raw(&self) -> Result<Option<String>, StoreError> {
        self.backend()?.get(&self.key)
    }

    /// Read the cached session. `Ok(None)` when nothing usable is stored.
    pub fn read(&self) -> Result<Option<Session>, StoreError> {
        let Some(blob) = self.raw()? else {
            return Ok(None);
        };
        let session = serde_json::from_str::<serde_json::Value>(&blob)
            .ok()
            .and_then(|value| Session::from_value(&value));
        if session.is_none() {
            warn!(key = %self.key, "ignoring unreadable cached session");
        }
        Ok(session)
    }

    pub fn write(&self, session: &Session) -> Result<(), StoreError> {
        let backend = self.backend()?;
        let blob = serde_json::to_string(session)?;
        backend.put(&self.key, &blob)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend()?.remove(&self.key)
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("key", &self.key)
            .field("available", &self.is_available())
            .finish()
    }
}
