use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{bail, Result};

use super::StorageBackend;

/// In-process backend with an optional quota on total key + value bytes.
#[derive(Default)]
pub struct MemoryBackend {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn used_bytes(&self) -> usize {
        Self::footprint(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn footprint(items: &HashMap<String, String>) -> usize {
        items.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.lock();

        if let Some(quota) = self.quota_bytes {
            let current = Self::footprint(&items);
            let replaced = items.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
            let projected = current - replaced + key.len() + value.len();
            if projected > quota {
                bail!("quota exceeded: writing '{key}' needs {projected} bytes, limit is {quota}");
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_counts_replaced_value_once() {
        let backend = MemoryBackend::with_quota(10);
        backend.set_item("ab", "12345678").unwrap();
        assert_eq!(backend.used_bytes(), 10);

        // Same size replacement fits, larger does not.
        backend.set_item("ab", "87654321").unwrap();
        let err = backend.set_item("ab", "123456789").unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(backend.get_item("ab").unwrap().as_deref(), Some("87654321"));

        backend.remove_item("ab").unwrap();
        assert_eq!(backend.used_bytes(), 0);
    }
}
