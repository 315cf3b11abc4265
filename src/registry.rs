//! Diagnostic registry of active clients.
//!
//! An explicit object with owned lifecycle: create one with
//! [`SessionRegistry::new`], hand it to each [`crate::SshConfig`] that
//! should announce itself, and drop it when diagnostics are no longer
//! wanted. Entries unregister themselves when their token is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::info;

#[derive(Debug)]
struct Entry {
    id: u64,
    label: String,
    since: Instant,
}

/// Registry of active client connections, for diagnostic dumping only.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a connection under a human-readable label.
    ///
    /// The entry lives until the returned token is dropped.
    pub fn register(self: &Arc<Self>, label: impl Into<String>) -> RegistryToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().unwrap().push(Entry {
            id,
            label: label.into(),
            since: Instant::now(),
        });
        RegistryToken {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Number of currently registered connections.
    pub fn active(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Log every registered connection and its age.
    pub fn dump(&self) {
        let entries = self.entries.lock().unwrap();
        info!("{} active client(s)", entries.len());
        for entry in entries.iter() {
            info!(
                "  {} (connected {:?} ago)",
                entry.label,
                entry.since.elapsed()
            );
        }
    }

    fn unregister(&self, id: u64) {
        self.entries.lock().unwrap().retain(|e| e.id != id);
    }
}

/// Handle tying a registry entry to a connection's lifetime.
#[derive(Debug)]
pub struct RegistryToken {
    registry: Arc<SessionRegistry>,
    id: u64,
}

impl Drop for RegistryToken {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_drop() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.active(), 0);

        let token = registry.register("admin@host1:22");
        assert_eq!(registry.active(), 1);

        drop(token);
        assert_eq!(registry.active(), 0);
    }

    #[test]
    fn test_tokens_are_independent() {
        let registry = SessionRegistry::new();
        let first = registry.register("a@h:22");
        let second = registry.register("b@h:22");
        assert_eq!(registry.active(), 2);

        drop(first);
        assert_eq!(registry.active(), 1);
        drop(second);
        assert_eq!(registry.active(), 0);
    }
}
