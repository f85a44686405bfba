//! Keyed mutual exclusion.
//!
//! The registry serializes its check-then-create and check-then-rename
//! sequences per canonical folder path; the export pipeline serializes per
//! session id. Guards are owned so callers can hold them across awaits; the
//! map-level mutex is only held long enough to fetch an entry, so unrelated
//! keys never serialize behind each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(key.to_string()).or_default().clone()
    }

    /// Wait for the key's critical section.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.entry(key).await.lock_owned().await
    }

    /// Enter the key's critical section only if it is currently free.
    pub async fn try_lock(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.entry(key).await.try_lock_owned().ok()
    }
}
