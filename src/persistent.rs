//! Typed, fault-tolerant binding between one storage key and one in-memory value.
//!
//! Reads and writes never fail outward. The most recent failure is kept as an
//! error string next to the value and cleared by the next successful write.
//! Changes made to the same key through other storage areas are applied
//! last-writer-wins when the owner drains them with [`PersistentValue::sync_external`].

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::storage::{StorageArea, StorageEvent};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Error surface of one persisted value, `{ "error"?: string }` on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct PersistentValue<T> {
    area: StorageArea,
    key: String,
    value: T,
    error: Option<String>,
    changes: broadcast::Receiver<StorageEvent>,
}

impl<T> PersistentValue<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Load `key`, seeding it with `initial` when absent.
    ///
    /// An unreadable or unparseable stored value is left untouched; `initial`
    /// is used in memory and the failure is recorded.
    pub fn open(area: StorageArea, key: impl Into<String>, initial: T) -> Self {
        let key = key.into();
        let mut error = None;

        let value = match area.get_item(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log_warn!(
                        "Stored value for '{key}' is not valid JSON, keeping it untouched: {err}"
                    );
                    error = Some(format!("failed to parse stored value for '{key}': {err}"));
                    initial
                }
            },
            Ok(None) => {
                if let Err(err) = write_json(&area, &key, &initial) {
                    log_warn!("Failed to seed '{key}': {err:#}");
                    error = Some(format!("{err:#}"));
                }
                initial
            }
            Err(err) => {
                log_warn!("Failed to read '{key}': {err:#}");
                error = Some(format!("{err:#}"));
                initial
            }
        };

        // Subscribing after the first load keeps its own seed write out of the stream.
        let changes = area.subscribe();

        Self {
            area,
            key,
            value,
            error,
            changes,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> StorageStatus {
        StorageStatus {
            error: self.error.clone(),
        }
    }

    /// Replace the value. Memory is updated even when persisting fails.
    pub fn set(&mut self, next: T) {
        self.value = next;
        self.persist();
    }

    /// Compute the next value from the previous one, then [`set`](Self::set) it.
    pub fn update(&mut self, updater: impl FnOnce(&T) -> T) {
        let next = updater(&self.value);
        self.set(next);
    }

    /// Mutate in place, then persist.
    pub fn modify(&mut self, mutator: impl FnOnce(&mut T)) {
        mutator(&mut self.value);
        self.persist();
    }

    /// Apply every pending change made to this key by other areas.
    /// Returns whether the in-memory value was replaced.
    pub fn sync_external(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.changes.try_recv() {
                Ok(event) => changed |= self.apply_external(&event),
                Err(TryRecvError::Lagged(skipped)) => {
                    log_warn!(
                        "Missed {skipped} storage notifications for '{}', re-reading",
                        self.key
                    );
                    changed |= self.reload();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        changed
    }

    /// Wait for the next change from another area that replaces the value.
    /// Returns `false` once the medium is gone.
    pub async fn next_external_change(&mut self) -> bool {
        loop {
            match self.changes.recv().await {
                Ok(event) => {
                    if self.apply_external(&event) {
                        return true;
                    }
                }
                Err(RecvError::Lagged(_)) => {
                    if self.reload() {
                        return true;
                    }
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }

    /// Apply one notification. Own writes, other keys, removals and malformed
    /// payloads are ignored.
    pub fn apply_external(&mut self, event: &StorageEvent) -> bool {
        if event.origin == self.area.id() || event.key != self.key {
            return false;
        }

        let Some(raw) = event.new_value.as_deref() else {
            return false;
        };

        match serde_json::from_str::<T>(raw) {
            Ok(parsed) => {
                log_debug!("Applied external change to '{}' from area {}", self.key, event.origin);
                self.value = parsed;
                true
            }
            Err(err) => {
                log_debug!("Ignoring malformed external value for '{}': {err}", self.key);
                false
            }
        }
    }

    fn reload(&mut self) -> bool {
        match self.area.get_item(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(parsed) => {
                    self.value = parsed;
                    true
                }
                Err(_) => false,
            },
            Ok(None) => false,
            Err(err) => {
                log_warn!("Failed to re-read '{}': {err:#}", self.key);
                false
            }
        }
    }

    fn persist(&mut self) {
        match write_json(&self.area, &self.key, &self.value) {
            Ok(()) => self.error = None,
            Err(err) => {
                log_warn!("Failed to persist '{}': {err:#}", self.key);
                self.error = Some(format!("{err:#}"));
            }
        }
    }
}

fn write_json<T: Serialize>(area: &StorageArea, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .with_context(|| format!("failed to serialize value for '{key}'"))?;
    area.set_item(key, &raw)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use anyhow::bail;

    use super::*;
    use crate::storage::{MemoryBackend, StorageBackend, StorageMedium};

    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl StorageBackend for FlakyBackend {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                bail!("storage unavailable");
            }
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                bail!("quota");
            }
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: i32,
    }

    #[test]
    fn seeds_initial_value_when_absent() {
        let medium = StorageMedium::in_memory();
        let area = medium.area();
        let value = PersistentValue::open(area.clone(), "test.key", Sample { a: 1 });

        assert_eq!(value.get(), &Sample { a: 1 });
        assert_eq!(value.error(), None);
        assert_eq!(area.get_item("test.key").unwrap().as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn reopen_yields_equal_value() {
        let medium = StorageMedium::in_memory();
        let mut value = PersistentValue::open(medium.area(), "list", Vec::<String>::new());
        value.set(vec!["x".into(), "y".into()]);

        let reopened = PersistentValue::open(medium.area(), "list", Vec::<String>::new());
        assert_eq!(reopened.get(), value.get());
        assert_eq!(reopened.error(), None);
    }

    #[test]
    fn corrupt_payload_is_kept_and_flagged() {
        let medium = StorageMedium::in_memory();
        let area = medium.area();
        area.set_item("test.key", "{not json").unwrap();

        let value = PersistentValue::open(area.clone(), "test.key", Sample { a: 7 });
        assert_eq!(value.get(), &Sample { a: 7 });
        assert!(value.error().unwrap().contains("failed to parse"));
        assert_eq!(area.get_item("test.key").unwrap().as_deref(), Some("{not json"));
    }

    #[test]
    fn read_failure_keeps_initial_without_writing() {
        let backend = Arc::new(FlakyBackend::default());
        backend.inner.set_item("test.key", r#"{"a":5}"#).unwrap();
        backend.fail_reads.store(true, Ordering::SeqCst);

        let medium = StorageMedium::new(backend.clone());
        let value = PersistentValue::open(medium.area(), "test.key", Sample { a: 1 });
        assert_eq!(value.get(), &Sample { a: 1 });
        assert_eq!(value.error(), Some("storage unavailable"));

        backend.fail_reads.store(false, Ordering::SeqCst);
        assert_eq!(
            backend.get_item("test.key").unwrap().as_deref(),
            Some(r#"{"a":5}"#)
        );
    }

    #[test]
    fn write_failure_updates_memory_and_sets_error() {
        let backend = Arc::new(FlakyBackend::default());
        let medium = StorageMedium::new(backend.clone());
        let mut value = PersistentValue::open(medium.area(), "test.key", Sample { a: 1 });
        assert_eq!(value.status(), StorageStatus::default());

        backend.fail_writes.store(true, Ordering::SeqCst);
        value.set(Sample { a: 2 });
        assert_eq!(value.get(), &Sample { a: 2 });
        assert_eq!(value.error(), Some("quota"));
        assert_eq!(
            backend.get_item("test.key").unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );

        backend.fail_writes.store(false, Ordering::SeqCst);
        value.update(|prev| Sample { a: prev.a + 1 });
        assert_eq!(value.get(), &Sample { a: 3 });
        assert_eq!(value.error(), None);
        assert_eq!(
            backend.get_item("test.key").unwrap().as_deref(),
            Some(r#"{"a":3}"#)
        );
    }

    #[test]
    fn seed_failure_is_reported() {
        let medium = StorageMedium::new(MemoryBackend::with_quota(3));
        let value = PersistentValue::open(medium.area(), "test.key", Sample { a: 1 });
        assert_eq!(value.get(), &Sample { a: 1 });
        assert!(value.error().unwrap().contains("quota exceeded"));
    }

    #[test]
    fn applies_changes_from_other_areas_only() {
        let medium = StorageMedium::in_memory();
        let mut mine = PersistentValue::open(medium.area(), "test.key", Sample { a: 1 });
        let mut theirs = PersistentValue::open(medium.area(), "test.key", Sample { a: 1 });

        mine.set(Sample { a: 2 });
        assert!(!mine.sync_external());
        assert!(theirs.sync_external());
        assert_eq!(theirs.get(), &Sample { a: 2 });

        // Notifications are applied as they arrive, without merging.
        theirs.set(Sample { a: 3 });
        mine.set(Sample { a: 4 });
        assert!(mine.sync_external());
        assert_eq!(mine.get(), &Sample { a: 3 });
        assert!(theirs.sync_external());
        assert_eq!(theirs.get(), &Sample { a: 4 });
    }

    #[test]
    fn ignores_malformed_removed_and_foreign_keys() {
        let medium = StorageMedium::in_memory();
        let other = medium.area();
        let mut value = PersistentValue::open(medium.area(), "test.key", Sample { a: 1 });

        other.set_item("test.key", "garbage").unwrap();
        other.set_item("other.key", r#"{"a":9}"#).unwrap();
        other.remove_item("test.key").unwrap();

        assert!(!value.sync_external());
        assert_eq!(value.get(), &Sample { a: 1 });
    }

    #[test]
    fn lagged_receiver_rereads_key() {
        let medium = StorageMedium::with_change_buffer(MemoryBackend::new(), 2);
        let other = medium.area();
        let mut value = PersistentValue::open(medium.area(), "test.key", Sample { a: 0 });

        for a in 1..=5 {
            other.set_item("test.key", &format!(r#"{{"a":{a}}}"#)).unwrap();
        }

        assert!(value.sync_external());
        assert_eq!(value.get(), &Sample { a: 5 });
    }

    #[tokio::test]
    async fn waits_for_external_change() {
        let medium = StorageMedium::in_memory();
        let other = medium.area();
        let mut value = PersistentValue::open(medium.area(), "test.key", Sample { a: 0 });

        let writer = tokio::spawn(async move {
            other.set_item("test.key", "garbage").unwrap();
            other.set_item("test.key", r#"{"a":42}"#).unwrap();
        });

        assert!(value.next_external_change().await);
        assert_eq!(value.get(), &Sample { a: 42 });
        writer.await.unwrap();
    }
}
