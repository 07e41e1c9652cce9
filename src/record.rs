//! Recipe rows as read from the record store.
//!
//! The pipeline never mutates recipes; it only reads the handful of fields the
//! text builder needs. List-valued fields (tags, ingredients) arrive either as
//! native lists or as JSON-serialized strings depending on how the row was
//! written, so both representations are accepted transparently.

use serde::{Deserialize, Serialize};

/// A field that may arrive as a structured list or a serialized JSON list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListField {
    /// Already-structured list of values.
    Items(Vec<String>),
    /// Raw string expected to contain a JSON array of strings.
    Serialized(String),
}

impl ListField {
    /// Parsed list values, or `None` when the field is empty or unparseable.
    ///
    /// A serialized form that fails to parse is treated the same as an absent
    /// field, never as an error.
    pub fn values(&self) -> Option<Vec<String>> {
        let items = match self {
            ListField::Items(items) => items.clone(),
            ListField::Serialized(raw) => serde_json::from_str::<Vec<String>>(raw).ok()?,
        };
        if items.is_empty() {
            None
        } else {
            Some(items)
        }
    }
}

/// Recipe fields consumed by the embedding text builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeRecord {
    /// Unique recipe identifier; also the backlog ordering key.
    pub id: String,
    /// Recipe name, the primary clause of the embedding text.
    pub name: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Cuisine label.
    pub cuisine: Option<String>,
    /// Tag list, native or serialized.
    pub tags: Option<ListField>,
    /// Ingredient list, native or serialized.
    pub ingredients: Option<ListField>,
    /// Difficulty label.
    pub difficulty: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_returns_native_items() {
        let field = ListField::Items(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(field.values(), Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn values_parses_serialized_json() {
        let field = ListField::Serialized(r#"["vegan","quick"]"#.to_string());
        assert_eq!(
            field.values(),
            Some(vec!["vegan".to_string(), "quick".to_string()])
        );
    }

    #[test]
    fn values_treats_invalid_json_as_absent() {
        let field = ListField::Serialized("invalid-json".to_string());
        assert_eq!(field.values(), None);
    }

    #[test]
    fn values_treats_empty_list_as_absent() {
        assert_eq!(ListField::Items(Vec::new()).values(), None);
        assert_eq!(ListField::Serialized("[]".to_string()).values(), None);
    }

    #[test]
    fn deserializes_both_representations() {
        let native: ListField = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(native.values(), Some(vec!["a".to_string(), "b".to_string()]));

        let serialized: ListField = serde_json::from_str(r#""[\"a\",\"b\"]""#).unwrap();
        assert_eq!(
            serialized.values(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }
}
