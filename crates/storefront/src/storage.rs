//! Durable key-value storage port and adapters.
//!
//! All persistent client state flows through [`StoragePort`]. The port is
//! deliberately best-effort: adapters log write failures and carry on, the
//! same way the browser client treated its local storage. Callers must not
//! assume a `set` is observable across process crashes mid-write.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Well-known storage keys.
///
/// The cart keys are owned by this library; `token` and `user` are written
/// by the auth module and only read here.
pub mod keys {
    /// Bearer token for API calls.
    pub const TOKEN: &str = "token";
    /// Cached profile record of the logged-in user.
    pub const USER: &str = "user";
    /// Anonymous cart partition.
    pub const CART_ANONYMOUS: &str = "cartItems";
    /// Prefix for per-identity cart partitions.
    pub const CART_PREFIX: &str = "cartItems_";
}

/// Injected key-value storage interface.
///
/// Implementations must be safe to share across the cart store and the
/// checkout flow; every mutation made through one handle is visible to the
/// next read through any other handle of the same adapter.
pub trait StoragePort: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str);

    /// Remove the entry stored under `key`, if any.
    fn remove(&self, key: &str);
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-memory storage adapter.
///
/// Used by tests and ephemeral sessions; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

// =============================================================================
// FileStorage
// =============================================================================

/// File-backed storage adapter.
///
/// Keeps the whole store as one JSON object on disk and rewrites it on
/// every mutation. A missing file loads as empty; a corrupt file is logged
/// and discarded rather than propagated.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create on first write) the store at `path`.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt storage file");
                    HashMap::new()
                }
            },
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Starting with empty storage");
                HashMap::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) {
        match serde_json::to_string_pretty(entries) {
            Ok(blob) => {
                if let Err(e) = fs::write(&self.path, blob) {
                    tracing::error!(path = %self.path.display(), error = %e, "Failed to write storage file");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize storage contents");
            }
        }
    }
}

impl StoragePort for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.flush(&entries);
        }
    }
}
