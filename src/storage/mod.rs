//! Synchronous string-keyed storage medium shared by one or more storage areas.
//!
//! A `StorageMedium` wraps one backend (in-memory or SQLite) and a broadcast
//! channel of change notifications. Each `StorageArea` opened on it plays the
//! role of a browser tab: it reads and writes the same keys, and is told about
//! writes made through every other area.

mod memory;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;
use tokio::sync::broadcast;

pub use memory::MemoryBackend;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

pub const DEFAULT_CHANGE_BUFFER: usize = 64;

/// Durable key-value substrate. Implementations must be synchronous.
pub trait StorageBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key)
    }
}

/// Identifies the storage area a change came from.
pub type AreaId = u64;

/// Notification published after a successful write or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    pub origin: AreaId,
}

struct MediumInner {
    backend: Box<dyn StorageBackend>,
    changes: broadcast::Sender<StorageEvent>,
    next_area: AtomicU64,
}

#[derive(Clone)]
pub struct StorageMedium {
    inner: Arc<MediumInner>,
}

impl StorageMedium {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self::with_change_buffer(backend, DEFAULT_CHANGE_BUFFER)
    }

    pub fn with_change_buffer(backend: impl StorageBackend + 'static, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(MediumInner {
                backend: Box::new(backend),
                changes,
                next_area: AtomicU64::new(1),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Open a new area with its own origin id.
    pub fn area(&self) -> StorageArea {
        let id = self.inner.next_area.fetch_add(1, Ordering::Relaxed);
        log_debug!("Opened storage area {id}");
        StorageArea {
            medium: self.clone(),
            id,
        }
    }
}

/// One participant's view of the medium.
#[derive(Clone)]
pub struct StorageArea {
    medium: StorageMedium,
    id: AreaId,
}

impl StorageArea {
    pub fn id(&self) -> AreaId {
        self.id
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.medium.inner.backend.get_item(key)
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let backend = &self.medium.inner.backend;
        let old_value = backend.get_item(key).ok().flatten();
        backend.set_item(key, value)?;
        self.publish(key, old_value, Some(value.to_string()));
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> Result<()> {
        let backend = &self.medium.inner.backend;
        let old_value = backend.get_item(key).ok().flatten();
        backend.remove_item(key)?;
        self.publish(key, old_value, None);
        Ok(())
    }

    /// Receiver for changes made through any area from now on, this one included.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.medium.inner.changes.subscribe()
    }

    fn publish(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        let event = StorageEvent {
            key: key.to_string(),
            old_value,
            new_value,
            origin: self.id,
        };
        // No subscribers is fine.
        let _ = self.medium.inner.changes.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_shared_across_areas() {
        let medium = StorageMedium::in_memory();
        let first = medium.area();
        let second = medium.area();
        assert_ne!(first.id(), second.id());

        first.set_item("k", "\"v\"").unwrap();
        assert_eq!(second.get_item("k").unwrap().as_deref(), Some("\"v\""));

        second.remove_item("k").unwrap();
        assert_eq!(first.get_item("k").unwrap(), None);
    }

    #[test]
    fn change_events_carry_origin_and_values() {
        let medium = StorageMedium::in_memory();
        let writer = medium.area();
        let reader = medium.area();
        let mut changes = reader.subscribe();

        writer.set_item("k", "1").unwrap();
        writer.set_item("k", "2").unwrap();
        writer.remove_item("k").unwrap();

        let first = changes.try_recv().unwrap();
        assert_eq!(first.origin, writer.id());
        assert_eq!(first.old_value, None);
        assert_eq!(first.new_value.as_deref(), Some("1"));

        let second = changes.try_recv().unwrap();
        assert_eq!(second.old_value.as_deref(), Some("1"));
        assert_eq!(second.new_value.as_deref(), Some("2"));

        let removed = changes.try_recv().unwrap();
        assert_eq!(removed.new_value, None);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn failed_write_publishes_nothing() {
        let medium = StorageMedium::new(MemoryBackend::with_quota(4));
        let area = medium.area();
        let mut changes = area.subscribe();

        assert!(area.set_item("key", "too long").is_err());
        assert!(changes.try_recv().is_err());
        assert_eq!(area.get_item("key").unwrap(), None);
    }
}
