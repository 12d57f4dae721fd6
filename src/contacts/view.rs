//! Derived, read-only views over the contact collection.

use std::{cmp::Ordering, collections::BTreeMap};

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::models::Contact;

/// Count key for contacts with no category.
pub const NO_CATEGORY_KEY: &str = "uncategorized";

/// Current search and category selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactFilter<'a> {
    pub query: &'a str,
    pub category_id: Option<&'a str>,
}

impl<'a> ContactFilter<'a> {
    pub fn new(query: &'a str, category_id: Option<&'a str>) -> Self {
        Self { query, category_id }
    }
}

/// Base letters only: combining marks dropped, lowercased.
fn primary_key(decomposed: &str) -> String {
    decomposed
        .chars()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Locale-style name ordering. Base letters decide first, so "Émile" sorts
/// with the E's. Ties go unaccented before accented, then lowercase before
/// uppercase. Composed and decomposed spellings compare equal.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let a: String = a.nfd().collect();
    let b: String = b.nfd().collect();

    primary_key(&a)
        .cmp(&primary_key(&b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| b.cmp(&a))
}

/// Stable alphabetical sort by name.
pub fn sort_alphabetically(contacts: &mut [Contact]) {
    contacts.sort_by(|a, b| compare_names(&a.name, &b.name));
}

/// Favorites first, then by name.
pub fn compare_for_display(a: &Contact, b: &Contact) -> Ordering {
    b.favorite
        .cmp(&a.favorite)
        .then_with(|| compare_names(&a.name, &b.name))
}

pub fn filter_and_sort(contacts: &[Contact], filter: ContactFilter<'_>) -> Vec<Contact> {
    let query = filter.query.trim().to_lowercase();

    let mut visible: Vec<Contact> = contacts
        .iter()
        .filter(|c| matches_query(c, &query))
        .filter(|c| match filter.category_id {
            Some(active) => c.category_id.as_deref() == Some(active),
            None => true,
        })
        .cloned()
        .collect();

    visible.sort_by(compare_for_display);
    visible
}

fn matches_query(contact: &Contact, query: &str) -> bool {
    query.is_empty()
        || contact.name.to_lowercase().contains(query)
        || contact.email.to_lowercase().contains(query)
}

pub fn counts_by_category(contacts: &[Contact]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for contact in contacts {
        let key = contact
            .category_id
            .clone()
            .unwrap_or_else(|| NO_CATEGORY_KEY.to_string());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}
