use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use crate::{
    models::{Category, CategoryColor, Contact, ContactInput, ToastKind, ToastMessage},
    persistent::{PersistentValue, StorageStatus},
    settings::StoreSettings,
    storage::{StorageArea, StorageMedium},
};

use super::{
    ids::{generate_id, CATEGORY_PREFIX, CONTACT_PREFIX},
    toasts::ToastQueue,
    view::{self, ContactFilter},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Everything the presentation layer reads, in one serializable value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactsState {
    pub contacts: Vec<Contact>,
    pub categories: Vec<Category>,
    pub search_query: String,
    pub active_category_id: Option<String>,
    pub toasts: Vec<ToastMessage>,
    pub filtered_and_sorted_contacts: Vec<Contact>,
    pub contacts_status: StorageStatus,
    pub categories_status: StorageStatus,
}

/// Canonical contacts and categories, their persistence, and the derived view.
///
/// Operations run to completion synchronously and never fail outward:
/// storage problems show up in [`contacts_status`](Self::contacts_status) /
/// [`categories_status`](Self::categories_status), user feedback as toasts.
pub struct ContactStore {
    contacts: PersistentValue<Vec<Contact>>,
    categories: PersistentValue<Vec<Category>>,
    search_query: String,
    active_category_id: Option<String>,
    toasts: ToastQueue,
    visible: Vec<Contact>,
}

fn default_categories() -> Vec<Category> {
    vec![Category::uncategorized(generate_id(CATEGORY_PREFIX))]
}

impl ContactStore {
    pub fn new(area: StorageArea, settings: &StoreSettings) -> Self {
        let contacts =
            PersistentValue::open(area.clone(), settings.contacts_key.as_str(), Vec::new());
        let categories =
            PersistentValue::open(area, settings.categories_key.as_str(), default_categories());

        let mut store = Self {
            contacts,
            categories,
            search_query: String::new(),
            active_category_id: None,
            toasts: ToastQueue::new(settings.toast_ttl()),
            visible: Vec::new(),
        };
        store.ensure_uncategorized();
        store.refresh_view();

        log_info!(
            "Contact store ready with {} contacts and {} categories",
            store.contacts.get().len(),
            store.categories.get().len()
        );
        store
    }

    /// Store on a fresh in-memory medium with default settings.
    pub fn in_memory() -> Self {
        Self::new(StorageMedium::in_memory().area(), &StoreSettings::default())
    }

    // ---- reads ----

    pub fn contacts(&self) -> &[Contact] {
        self.contacts.get()
    }

    pub fn categories(&self) -> &[Category] {
        self.categories.get()
    }

    pub fn contact(&self, id: &str) -> Option<&Contact> {
        self.contacts.get().iter().find(|c| c.id == id)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.get().iter().find(|c| c.id == id)
    }

    pub fn uncategorized_id(&self) -> Option<&str> {
        self.categories
            .get()
            .iter()
            .find(|c| c.is_uncategorized())
            .map(|c| c.id.as_str())
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn active_category_id(&self) -> Option<&str> {
        self.active_category_id.as_deref()
    }

    /// Contacts matching the search and category filter, favorites first.
    pub fn filtered_and_sorted_contacts(&self) -> &[Contact] {
        &self.visible
    }

    pub fn counts_by_category(&self) -> BTreeMap<String, usize> {
        view::counts_by_category(self.contacts.get())
    }

    pub fn toasts(&self) -> Vec<ToastMessage> {
        self.toasts.snapshot()
    }

    pub fn contacts_status(&self) -> StorageStatus {
        self.contacts.status()
    }

    pub fn categories_status(&self) -> StorageStatus {
        self.categories.status()
    }

    pub fn snapshot(&self) -> ContactsState {
        ContactsState {
            contacts: self.contacts.get().clone(),
            categories: self.categories.get().clone(),
            search_query: self.search_query.clone(),
            active_category_id: self.active_category_id.clone(),
            toasts: self.toasts.snapshot(),
            filtered_and_sorted_contacts: self.visible.clone(),
            contacts_status: self.contacts.status(),
            categories_status: self.categories.status(),
        }
    }

    // ---- view selection ----

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
        self.refresh_view();
    }

    pub fn set_active_category_id(&mut self, category_id: Option<String>) {
        self.active_category_id = category_id;
        self.refresh_view();
    }

    pub fn dismiss_toast(&self, id: &str) -> bool {
        self.toasts.dismiss(id)
    }

    // ---- contact mutations ----

    /// Insert a contact built from already-validated form values and return its id.
    pub fn add_contact(&mut self, values: &ContactInput) -> String {
        let values = values.trimmed();
        let category_id = values
            .category_id
            .or_else(|| self.uncategorized_id().map(str::to_string));

        let contact = Contact {
            id: generate_id(CONTACT_PREFIX),
            name: values.name,
            email: values.email,
            phone: values.phone,
            category_id,
            favorite: values.favorite.unwrap_or(false),
            created_at: Utc::now(),
        };
        let id = contact.id.clone();
        log_debug!("Adding contact {id}");

        self.contacts.modify(|contacts| {
            contacts.push(contact);
            view::sort_alphabetically(contacts);
        });
        self.refresh_view();
        self.toasts.push(ToastKind::Success, "Contact added");
        id
    }

    /// Replace the editable fields of `id`. Unknown ids leave the collection as is.
    pub fn update_contact(&mut self, id: &str, values: &ContactInput) {
        let values = values.trimmed();
        let fallback = self.uncategorized_id().map(str::to_string);

        self.contacts.modify(|contacts| {
            if let Some(contact) = contacts.iter_mut().find(|c| c.id == id) {
                contact.name = values.name;
                contact.email = values.email;
                contact.phone = values.phone;
                contact.category_id = values.category_id.or(fallback);
                contact.favorite = values.favorite.unwrap_or(contact.favorite);
            }
            view::sort_alphabetically(contacts);
        });
        self.refresh_view();
        self.toasts.push(ToastKind::Success, "Contact updated");
    }

    pub fn delete_contact(&mut self, id: &str) {
        log_debug!("Deleting contact {id}");
        self.contacts.modify(|contacts| contacts.retain(|c| c.id != id));
        self.refresh_view();
        self.toasts.push(ToastKind::Success, "Contact deleted");
    }

    pub fn toggle_favorite(&mut self, id: &str) {
        self.contacts.modify(|contacts| {
            if let Some(contact) = contacts.iter_mut().find(|c| c.id == id) {
                contact.favorite = !contact.favorite;
            }
            view::sort_alphabetically(contacts);
        });
        self.refresh_view();
    }

    // ---- category mutations ----

    /// Add a category and return its id.
    ///
    /// A blank name returns the Uncategorized id. A name that already exists
    /// (ignoring case) returns the existing id and raises a warning toast.
    pub fn add_category(&mut self, name: &str, color: Option<CategoryColor>) -> String {
        let cleaned = name.trim();
        if cleaned.is_empty() {
            return self.uncategorized_id().unwrap_or_default().to_string();
        }

        if let Some(existing) = self.categories.get().iter().find(|c| c.has_name(cleaned)) {
            let id = existing.id.clone();
            self.toasts.push(ToastKind::Warning, "Category already exists");
            return id;
        }

        let color =
            color.unwrap_or_else(|| CategoryColor::for_position(self.categories.get().len()));
        let category = Category {
            id: generate_id(CATEGORY_PREFIX),
            name: cleaned.to_string(),
            color,
        };
        let id = category.id.clone();
        log_debug!("Adding category {id} ({})", color.as_str());

        self.categories.modify(|categories| categories.insert(0, category));
        self.toasts.push(ToastKind::Success, "Category added");
        id
    }

    /// Rename without re-checking uniqueness. Blank names are ignored.
    pub fn rename_category(&mut self, id: &str, new_name: &str) {
        let cleaned = new_name.trim();
        if cleaned.is_empty() {
            return;
        }

        self.categories.modify(|categories| {
            if let Some(category) = categories.iter_mut().find(|c| c.id == id) {
                category.name = cleaned.to_string();
            }
        });
        self.ensure_uncategorized();
        self.toasts.push(ToastKind::Success, "Category renamed");
    }

    /// Remove a category and move its contacts to `reassign_to`, or to
    /// Uncategorized when no existing target is given.
    pub fn delete_category(&mut self, id: &str, reassign_to: Option<&str>) {
        self.categories
            .modify(|categories| categories.retain(|c| c.id != id));
        let uncategorized = self.ensure_uncategorized();

        let fallback = reassign_to
            .filter(|target| *target != id && self.category(target).is_some())
            .map(str::to_string)
            .unwrap_or(uncategorized);
        log_debug!("Deleting category {id}, contacts move to {fallback}");

        self.contacts.modify(|contacts| {
            for contact in contacts
                .iter_mut()
                .filter(|c| c.category_id.as_deref() == Some(id))
            {
                contact.category_id = Some(fallback.clone());
            }
        });
        self.refresh_view();
        self.toasts.push(ToastKind::Success, "Category deleted");
    }

    // ---- cross-area sync ----

    /// Apply changes written by other storage areas. Returns whether anything changed.
    pub fn sync_external_changes(&mut self) -> bool {
        let contacts_changed = self.contacts.sync_external();
        let categories_changed = self.categories.sync_external();
        self.after_external_change(contacts_changed, categories_changed)
    }

    /// Wait until another storage area changes either collection, then apply
    /// everything pending.
    pub async fn next_external_change(&mut self) -> bool {
        let (contacts_changed, categories_changed) = tokio::select! {
            changed = self.contacts.next_external_change() => (changed, false),
            changed = self.categories.next_external_change() => (false, changed),
        };
        let contacts_changed = contacts_changed | self.contacts.sync_external();
        let categories_changed = categories_changed | self.categories.sync_external();
        self.after_external_change(contacts_changed, categories_changed)
    }

    fn after_external_change(&mut self, contacts_changed: bool, categories_changed: bool) -> bool {
        if categories_changed {
            self.ensure_uncategorized();
        }
        if contacts_changed {
            self.refresh_view();
        }
        if contacts_changed || categories_changed {
            log_info!(
                "Applied external changes (contacts: {contacts_changed}, categories: {categories_changed})"
            );
        }
        contacts_changed || categories_changed
    }

    // ---- invariants ----

    /// Make sure an Uncategorized category exists, prepending and persisting
    /// one if needed. Returns its id.
    fn ensure_uncategorized(&mut self) -> String {
        if let Some(id) = self.uncategorized_id() {
            return id.to_string();
        }

        let fallback = Category::uncategorized(generate_id(CATEGORY_PREFIX));
        let id = fallback.id.clone();
        log_info!("Restoring missing '{}' category as {id}", fallback.name);
        self.categories
            .modify(|categories| categories.insert(0, fallback));
        id
    }

    fn refresh_view(&mut self) {
        let filter = ContactFilter::new(&self.search_query, self.active_category_id.as_deref());
        self.visible = view::filter_and_sort(self.contacts.get(), filter);
    }
}
