//! Category data models.
//!
//! A category is a named, colored label that groups contacts. The collection
//! always holds one "Uncategorized" fallback (matched case-insensitively).

use serde::{Deserialize, Serialize};

pub const UNCATEGORIZED_NAME: &str = "Uncategorized";

/// Fixed seven-swatch palette for category badges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CategoryColor {
    Primary,
    Secondary,
    Accent,
    Info,
    Success,
    Warning,
    Error,
}

impl CategoryColor {
    /// Palette in assignment order.
    pub const PALETTE: [CategoryColor; 7] = [
        CategoryColor::Primary,
        CategoryColor::Secondary,
        CategoryColor::Accent,
        CategoryColor::Info,
        CategoryColor::Success,
        CategoryColor::Warning,
        CategoryColor::Error,
    ];

    /// Color for the category created when `existing` categories are already present.
    pub fn for_position(existing: usize) -> Self {
        Self::PALETTE[existing % Self::PALETTE.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryColor::Primary => "primary",
            CategoryColor::Secondary => "secondary",
            CategoryColor::Accent => "accent",
            CategoryColor::Info => "info",
            CategoryColor::Success => "success",
            CategoryColor::Warning => "warning",
            CategoryColor::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: CategoryColor,
}

impl Category {
    pub fn uncategorized(id: String) -> Self {
        Self {
            id,
            name: UNCATEGORIZED_NAME.to_string(),
            color: CategoryColor::Info,
        }
    }

    /// Case-insensitive name comparison used for uniqueness and the fallback lookup.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    pub fn is_uncategorized(&self) -> bool {
        self.has_name(UNCATEGORIZED_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_cycles_by_position() {
        assert_eq!(CategoryColor::for_position(0), CategoryColor::Primary);
        assert_eq!(CategoryColor::for_position(3), CategoryColor::Info);
        assert_eq!(CategoryColor::for_position(7), CategoryColor::Primary);
        assert_eq!(CategoryColor::for_position(13), CategoryColor::Error);
    }

    #[test]
    fn uncategorized_match_ignores_case() {
        let category = Category {
            id: "cat_1".into(),
            name: "UNCATEGORIZED".into(),
            color: CategoryColor::Accent,
        };
        assert!(category.is_uncategorized());
        assert!(!Category::uncategorized("cat_2".into()).has_name("Work"));
    }

    #[test]
    fn serializes_with_lowercase_color() {
        let category = Category {
            id: "cat_1".into(),
            name: "Work".into(),
            color: CategoryColor::Secondary,
        };
        let json = serde_json::to_value(&category).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": "cat_1", "name": "Work", "color": "secondary" })
        );
    }
}
