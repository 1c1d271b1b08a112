//! # Browser `localStorage` session store
//!
//! [`LocalStorageStore`] is the [`SessionStore`] used on the **web platform**.
//! It writes the session blob straight into `window.localStorage`, which is
//! synchronous and origin-scoped, matching what the session cache needs.
//!
//! ## Capability probe
//!
//! [`LocalStorageStore::open`] is the one place that asks the browser whether
//! storage exists. It fails with [`StoreError::Unavailable`] when there is no
//! window (workers), when `localStorage` is `null`, or when accessing it throws
//! (some privacy modes). Hosts pass the result to [`crate::LocalCache::new`] as an
//! `Option`, so the check never repeats per call.

use wasm_bindgen::JsValue;
use web_sys::Storage;

use crate::cache::SessionStore;
use crate::error::StoreError;

/// `window.localStorage`-backed SessionStore for the web platform.
#[derive(Clone, Debug)]
pub struct LocalStorageStore {
    storage: Storage,
}

impl LocalStorageStore {
    pub fn open() -> Result<Self, StoreError> {
        let window = web_sys::window().ok_or(StoreError::Unavailable)?;
        let storage = window
            .local_storage()
            .ok()
            .flatten()
            .ok_or(StoreError::Unavailable)?;
        Ok(Self { storage })
    }
}

fn backend_error(err: JsValue) -> StoreError {
    StoreError::Backend(format!("{err:?}"))
}

impl SessionStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage.get_item(key).map_err(backend_error)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage.set_item(key, value).map_err(backend_error)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.storage.remove_item(key).map_err(backend_error)
    }
}
