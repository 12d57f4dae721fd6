//! Contact book state: contacts and categories, their derived view, and
//! fault-tolerant persistence on a shared key-value storage medium.

mod contacts;
mod db;
mod models;
mod persistent;
mod settings;
mod storage;
mod utils;

use std::path::Path;

use anyhow::{Context, Result};
use log::info;

pub use contacts::{
    filter_and_sort, ids::generate_id, view::compare_names, view::counts_by_category,
    ContactFilter, ContactStore, ContactsState, ToastQueue, DEFAULT_TOAST_TTL,
};
pub use db::SqliteBackend;
pub use models::{
    contact::validation, Category, CategoryColor, Contact, ContactInput, ToastKind, ToastMessage,
    UNCATEGORIZED_NAME,
};
pub use persistent::{PersistentValue, StorageStatus};
pub use settings::{SettingsStore, StoreSettings, TOAST_TTL_ENV};
pub use storage::{
    AreaId, MemoryBackend, StorageArea, StorageBackend, StorageEvent, StorageMedium,
};
pub use utils::init_logging;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DATABASE_FILE: &str = "contactbook.sqlite3";

/// One storage medium plus the settings every store opened on it shares.
///
/// Each call to [`ContactBook::store`] opens a new storage area, so two stores
/// from the same book behave like two tabs of the same browser.
pub struct ContactBook {
    settings: StoreSettings,
    medium: StorageMedium,
}

impl ContactBook {
    /// Open (or create) a book under `data_dir`: `settings.json` and a SQLite database.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?
            .current()
            .with_env_overrides();
        let backend = SqliteBackend::open(data_dir.join(DATABASE_FILE))?;
        let medium = StorageMedium::with_change_buffer(backend, settings.change_buffer);

        info!("Contact book opened at {}", data_dir.display());
        Ok(Self { settings, medium })
    }

    /// Book on an in-memory backend, honouring `storage_quota_bytes`.
    pub fn in_memory(settings: StoreSettings) -> Self {
        let backend = match settings.storage_quota_bytes {
            Some(quota) => MemoryBackend::with_quota(quota),
            None => MemoryBackend::new(),
        };
        let medium = StorageMedium::with_change_buffer(backend, settings.change_buffer);
        Self { settings, medium }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn medium(&self) -> &StorageMedium {
        &self.medium
    }

    /// Construct a store on a fresh storage area.
    pub fn store(&self) -> ContactStore {
        ContactStore::new(self.medium.area(), &self.settings)
    }
}

/// Open the book under `data_dir` and construct its store.
pub fn open_contact_book(data_dir: impl AsRef<Path>) -> Result<ContactStore> {
    Ok(ContactBook::open(data_dir)?.store())
}
