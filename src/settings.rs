use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const TOAST_TTL_ENV: &str = "CONTACTBOOK_TOAST_MS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    pub contacts_key: String,
    pub categories_key: String,
    pub toast_ttl_ms: u64,
    /// Capacity of the cross-area change channel.
    pub change_buffer: usize,
    /// Only honoured by the in-memory backend.
    pub storage_quota_bytes: Option<usize>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            contacts_key: "contactBook.contacts.v1".into(),
            categories_key: "contactBook.categories.v1".into(),
            toast_ttl_ms: 2500,
            change_buffer: crate::storage::DEFAULT_CHANGE_BUFFER,
            storage_quota_bytes: None,
        }
    }
}

impl StoreSettings {
    pub fn toast_ttl(&self) -> Duration {
        Duration::from_millis(self.toast_ttl_ms)
    }

    /// Apply `CONTACTBOOK_TOAST_MS` when it holds a valid integer.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(TOAST_TTL_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.toast_ttl_ms = ms,
                Err(err) => log_warn!("Ignoring {TOAST_TTL_ENV}={raw:?}: {err}"),
            }
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<StoreSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("Settings at {} are malformed, using defaults: {err}", path.display());
                StoreSettings::default()
            })
        } else {
            StoreSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> StoreSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: StoreSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: StoreSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", self.path.display()))?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = data;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, data: &StoreSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.current(), StoreSettings::default());
        assert_eq!(store.current().toast_ttl(), Duration::from_millis(2500));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "toastTtlMs": 100 }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().current();
        assert_eq!(settings.toast_ttl_ms, 100);
        assert_eq!(settings.contacts_key, "contactBook.contacts.v1");
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{{{").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.current(), StoreSettings::default());
        assert!(store.reload().is_err());
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let settings = StoreSettings {
            contacts_key: "book.contacts".into(),
            ..StoreSettings::default()
        };
        store.update(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.current(), settings);
        reopened.reload().unwrap();
        assert_eq!(reopened.current().contacts_key, "book.contacts");
    }
}
