//! Load guard
//!
//! A flag in the session store marking an engine load as in flight. The flag
//! lives as long as the session store, so a restarted process never sees a
//! stale one.

use crate::storage::{KeyValueStore, StorageError};
use std::sync::Arc;
use uuid::Uuid;

/// Key the flag is stored under
pub const LOAD_GUARD_KEY: &str = "engine-load-in-flight";

#[derive(Clone)]
pub struct LoadGuard {
    session: Arc<dyn KeyValueStore>,
}

impl LoadGuard {
    pub fn new(session: Arc<dyn KeyValueStore>) -> Self {
        Self { session }
    }

    /// Whether a load is in flight. An unreadable store counts as set.
    pub fn is_set(&self) -> bool {
        match self.session.get(LOAD_GUARD_KEY) {
            Ok(value) => value.is_some(),
            Err(e) => {
                tracing::warn!("Failed to read load guard: {}", e);
                true
            }
        }
    }

    /// Set the flag unless it is already set.
    ///
    /// Returns `None` when another load holds it. The returned lease clears
    /// the flag when released or dropped.
    pub fn try_acquire(&self) -> Result<Option<LoadLease>, StorageError> {
        if self.session.get(LOAD_GUARD_KEY)?.is_some() {
            return Ok(None);
        }
        let token = Uuid::new_v4().to_string();
        self.session.set(LOAD_GUARD_KEY, &token)?;
        Ok(Some(LoadLease {
            guard: self.clone(),
            token,
            released: false,
        }))
    }

    /// Clear the flag regardless of who set it
    pub fn clear(&self) {
        if let Err(e) = self.session.remove(LOAD_GUARD_KEY) {
            tracing::warn!("Failed to clear load guard: {}", e);
        }
    }
}

/// Ownership of the load guard for one load attempt
pub struct LoadLease {
    guard: LoadGuard,
    token: String,
    released: bool,
}

impl LoadLease {
    pub fn release(mut self) {
        self.release_inner();
    }

    // Only clears the flag while it still carries this attempt's token, so a
    // stale lease cannot clear a newer attempt's flag.
    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.guard.session.get(LOAD_GUARD_KEY) {
            Ok(Some(current)) if current == self.token => self.guard.clear(),
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to read load guard on release: {}", e),
        }
    }
}

impl Drop for LoadLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}
