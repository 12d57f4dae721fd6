//! Contact data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single person's record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub category_id: Option<String>,
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
}

/// Form values for creating or updating a contact
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub favorite: Option<bool>,
}

impl ContactInput {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn favorite(mut self, favorite: bool) -> Self {
        self.favorite = Some(favorite);
        self
    }

    /// Copy with name, email and phone trimmed.
    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            category_id: self.category_id.clone(),
            favorite: self.favorite,
        }
    }
}

/// Validation run by the form layer before it calls into the store.
/// The store itself trusts its inputs.
pub mod validation {
    use anyhow::{bail, Result};
    use once_cell::sync::Lazy;
    use regex::Regex;
    use serde::Serialize;

    use super::ContactInput;

    pub const NAME_REQUIRED: &str = "Name is required";
    pub const EMAIL_INVALID: &str = "Valid email required";

    static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    });

    /// Per-field messages; `None` means the field passed.
    #[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
    #[serde(rename_all = "camelCase")]
    pub struct ContactValidationErrors {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub email: Option<String>,
    }

    impl ContactValidationErrors {
        pub fn is_empty(&self) -> bool {
            self.name.is_none() && self.email.is_none()
        }
    }

    pub fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            bail!(NAME_REQUIRED);
        }
        Ok(())
    }

    pub fn validate_email(email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() || !EMAIL_PATTERN.is_match(email) {
            bail!(EMAIL_INVALID);
        }
        Ok(())
    }

    pub fn validate_contact_input(input: &ContactInput) -> Result<(), ContactValidationErrors> {
        let errors = ContactValidationErrors {
            name: validate_name(&input.name).err().map(|e| e.to_string()),
            email: validate_email(&input.email).err().map(|e| e.to_string()),
        };

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
