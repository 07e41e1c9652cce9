//! Deterministic embedding-text derivation from recipe fields.

use crate::record::{ListField, RecipeRecord};

/// Builds the canonical embedding text for a recipe.
///
/// Clause order is fixed: name, description, cuisine, tags, ingredients,
/// difficulty. Missing, empty, or unparseable fields contribute nothing.
/// The result may be empty when no field is present; callers must check for
/// that before embedding.
pub fn build_embedding_text(recipe: &RecipeRecord) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(name) = present(&recipe.name) {
        parts.push(name.to_string());
    }
    if let Some(description) = present(&recipe.description) {
        parts.push(description.to_string());
    }
    if let Some(cuisine) = present(&recipe.cuisine) {
        parts.push(format!("Cuisine: {cuisine}"));
    }
    if let Some(tags) = list_values(&recipe.tags) {
        parts.push(format!("Tags: {}", tags.join(", ")));
    }
    if let Some(ingredients) = list_values(&recipe.ingredients) {
        parts.push(format!("Ingredients: {}", ingredients.join(", ")));
    }
    if let Some(difficulty) = present(&recipe.difficulty) {
        parts.push(format!("Difficulty: {difficulty}"));
    }

    parts.join(". ").trim().to_string()
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

fn list_values(field: &Option<ListField>) -> Option<Vec<String>> {
    field.as_ref().and_then(ListField::values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(id: &str) -> RecipeRecord {
        RecipeRecord {
            id: id.to_string(),
            ..RecipeRecord::default()
        }
    }

    #[test]
    fn name_only_yields_bare_name() {
        let mut record = recipe("r1");
        record.name = Some("Simple Salad".to_string());
        assert_eq!(build_embedding_text(&record), "Simple Salad");
    }

    #[test]
    fn all_fields_join_in_fixed_order() {
        let mut record = recipe("r2");
        record.name = Some("Name".to_string());
        record.description = Some("Description".to_string());
        record.cuisine = Some("Italian".to_string());
        record.tags = Some(ListField::Items(vec!["a".to_string(), "b".to_string()]));
        record.difficulty = Some("medium".to_string());
        assert_eq!(
            build_embedding_text(&record),
            "Name. Description. Cuisine: Italian. Tags: a, b. Difficulty: medium"
        );
    }

    #[test]
    fn ingredients_render_between_tags_and_difficulty() {
        let mut record = recipe("r3");
        record.name = Some("Pasta".to_string());
        record.tags = Some(ListField::Serialized(r#"["quick"]"#.to_string()));
        record.ingredients = Some(ListField::Serialized(
            r#"["spaghetti","garlic","olive oil"]"#.to_string(),
        ));
        assert_eq!(
            build_embedding_text(&record),
            "Pasta. Tags: quick. Ingredients: spaghetti, garlic, olive oil"
        );
    }

    #[test]
    fn unparseable_tags_match_omitted_tags() {
        let mut with_bad_tags = recipe("r4");
        with_bad_tags.name = Some("Soup".to_string());
        with_bad_tags.tags = Some(ListField::Serialized("invalid-json".to_string()));

        let mut without_tags = recipe("r4");
        without_tags.name = Some("Soup".to_string());

        assert_eq!(
            build_embedding_text(&with_bad_tags),
            build_embedding_text(&without_tags)
        );
    }

    #[test]
    fn empty_record_yields_empty_string() {
        assert_eq!(build_embedding_text(&recipe("r5")), "");
    }

    #[test]
    fn empty_string_fields_contribute_nothing() {
        let mut record = recipe("r6");
        record.name = Some(String::new());
        record.cuisine = Some("Thai".to_string());
        assert_eq!(build_embedding_text(&record), "Cuisine: Thai");
    }

    #[test]
    fn build_is_pure_and_repeatable() {
        let mut record = recipe("r7");
        record.name = Some("Stew".to_string());
        record.ingredients = Some(ListField::Items(vec!["beef".to_string()]));
        assert_eq!(build_embedding_text(&record), build_embedding_text(&record));
    }
}
