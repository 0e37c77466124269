//! AI-assisted recipe generation.
//!
//! The prompt text and reply parsing live here. The actual call to a
//! text-generation service is behind [`RecipeGenerator`] so the CLI can plug
//! in an HTTP client and tests can plug in a canned reply.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{
    NewIngredient, NewRecipe, NewStep, RECIPE_NOTES_MAX, validate_new_ingredient,
    validate_new_recipe, validate_new_step,
};
use crate::units::{VolumeUnit, WeightUnit};

/// External text-generation collaborator.
///
/// Called synchronously. Async callers should run it on a blocking thread.
pub trait RecipeGenerator: Send + Sync {
    /// Send a system and user message, returning the raw reply text.
    fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedRecipe {
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ingredients: Vec<NewIngredient>,
    #[serde(default)]
    pub steps: Vec<NewStep>,
}

impl GeneratedRecipe {
    #[must_use]
    pub fn to_new_recipe(&self) -> NewRecipe {
        NewRecipe {
            title: self.title.clone(),
            notes: self.notes.clone(),
            favorite: false,
        }
    }
}

fn quoted_list(symbols: impl Iterator<Item = &'static str>) -> String {
    let quoted: Vec<String> = symbols.map(|s| format!("\"{s}\"")).collect();
    format!("[{}]", quoted.join(", "))
}

#[must_use]
pub fn system_instructions() -> String {
    let volume = quoted_list(VolumeUnit::ALL.into_iter().map(VolumeUnit::symbol));
    let weight = quoted_list(WeightUnit::ALL.into_iter().map(WeightUnit::symbol));
    format!(
        r#"You are a professional chef and nutrition-focused recipe generator.
Generate delicious, realistic, step-by-step recipes for a cooking app.
Respond with valid JSON only, no text outside the JSON object.

Each recipe must include:
- title (string)
- notes (1-3 sentences about flavor, nutrition and total prep/cook time)
- tags (list of lowercase strings, e.g. ["contains_dairy", "spicy"])
- ingredients (list of objects: {{name, quantity, volume_unit, weight_unit}})
- steps (list of objects: {{step (int), description (string)}})

Ingredient rules:
- Allowed volume_unit values: {volume}
- Allowed weight_unit values: {weight}
- Each ingredient has either a volume_unit, a weight_unit, or neither. Never both.
- Quantities are positive numbers.
- If an ingredient has no measurable unit (a clove, a slice), convert it to a measurable one
  (1 garlic clove -> 1 tsp minced garlic) or set both units to null and put the form in the
  name (name "Garlic Clove", quantity 1).

Cooking style:
- Give time ranges, heat levels and visual cues ("until golden", "until thickened").
- For meats give doneness cues and internal temperature.
- Keep flavors balanced and realistic.

Example:
{{
  "title": "Creamy Spicy Chicken Rice Bowl",
  "notes": "A high-protein rice bowl with seared chicken and a yogurt-sriracha sauce. Prep 15 minutes, cook 20 minutes.",
  "tags": ["contains_dairy", "spicy"],
  "ingredients": [
    {{"name": "Chicken Breast", "quantity": 200, "weight_unit": "g", "volume_unit": null}},
    {{"name": "Olive Oil", "quantity": 1, "weight_unit": null, "volume_unit": "tbsp"}},
    {{"name": "Egg", "quantity": 1, "weight_unit": null, "volume_unit": null}}
  ],
  "steps": [
    {{"step": 1, "description": "Pat the chicken dry and season both sides."}},
    {{"step": 2, "description": "Sear over medium-high heat for 5-6 minutes per side until 74C / 165F inside."}}
  ]
}}"#
    )
}

#[must_use]
pub fn user_message(prompt: &str, tags: &[String]) -> String {
    let tags_text = if tags.is_empty() {
        "no dietary tags".to_string()
    } else {
        tags.join(", ")
    };
    format!(
        "Generate a recipe based on this request: '{prompt}'. \
         The recipe should align with these tags: '{tags_text}'."
    )
}

/// Remove Markdown code fences some models wrap around JSON.
#[must_use]
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse and validate a model reply.
///
/// Units are checked against the tables and ingredient names and step text
/// are trimmed. Notes longer than a recipe allows are cut short.
pub fn parse_generated_recipe(raw: &str) -> Result<GeneratedRecipe> {
    let cleaned = strip_code_fences(raw);
    let parsed: GeneratedRecipe =
        serde_json::from_str(&cleaned).map_err(|e| Error::Generation {
            message: format!("Failed to parse AI response as JSON: {e}"),
            raw: Some(raw.to_string()),
        })?;

    // Reply validation failures surface as generation errors carrying the raw text.
    let rejected = |err: Error| Error::Generation {
        message: format!("AI response failed validation: {err}"),
        raw: Some(raw.to_string()),
    };

    let mut recipe = parsed.to_new_recipe();
    recipe.notes = recipe.notes.chars().take(RECIPE_NOTES_MAX).collect();
    let recipe = validate_new_recipe(&recipe).map_err(rejected)?;

    let ingredients = parsed
        .ingredients
        .iter()
        .map(validate_new_ingredient)
        .collect::<Result<Vec<_>>>()
        .map_err(rejected)?;
    let steps = parsed
        .steps
        .iter()
        .map(validate_new_step)
        .collect::<Result<Vec<_>>>()
        .map_err(rejected)?;
    let tags = parsed
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    Ok(GeneratedRecipe {
        title: recipe.title,
        notes: recipe.notes,
        tags,
        ingredients,
        steps,
    })
}

/// Ask `generator` for a recipe and parse the reply.
pub fn generate_recipe(
    generator: &dyn RecipeGenerator,
    prompt: &str,
    tags: &[String],
) -> Result<GeneratedRecipe> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(Error::validation("prompt", "Prompt is required."));
    }
    let reply = generator
        .complete(&system_instructions(), &user_message(prompt, tags))
        .map_err(|e| Error::Generation {
            message: format!("Recipe generation failed: {e:#}"),
            raw: None,
        })?;
    tracing::debug!(chars = reply.len(), "received generated recipe");
    parse_generated_recipe(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    struct CannedGenerator {
        reply: anyhow::Result<String>,
    }

    impl RecipeGenerator for CannedGenerator {
        fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
            assert!(system.contains("Allowed volume_unit"));
            assert!(user.contains("Generate a recipe"));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    const REPLY: &str = r#"```json
{
  "title": " Garlic Butter Pasta ",
  "notes": "Quick and rich.",
  "tags": ["Contains_Dairy", " "],
  "ingredients": [
    {"name": "Spaghetti", "quantity": 200, "weight_unit": "g", "volume_unit": null},
    {"name": "Butter", "quantity": 2, "weight_unit": null, "volume_unit": "tbsp"},
    {"name": "Garlic Clove", "quantity": 3, "weight_unit": null, "volume_unit": null}
  ],
  "steps": [
    {"step": 1, "description": "Boil the pasta for 9 minutes."},
    {"step": 2, "description": "Melt butter with garlic and toss."}
  ]
}
```"#;

    #[test]
    fn test_system_instructions_list_every_unit() {
        let text = system_instructions();
        for unit in VolumeUnit::ALL {
            assert!(text.contains(&format!("\"{}\"", unit.symbol())));
        }
        for unit in WeightUnit::ALL {
            assert!(text.contains(&format!("\"{}\"", unit.symbol())));
        }
        assert!(text.contains("{name, quantity, volume_unit, weight_unit}"));
    }

    #[test]
    fn test_user_message_tags() {
        assert!(user_message("soup", &[]).contains("no dietary tags"));
        let msg = user_message("soup", &["vegan".to_string(), "spicy".to_string()]);
        assert!(msg.contains("'soup'"));
        assert!(msg.contains("vegan, spicy"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences(" {} "), "{}");
    }

    #[test]
    fn test_parse_generated_recipe() {
        let recipe = parse_generated_recipe(REPLY).unwrap();
        assert_eq!(recipe.title, "Garlic Butter Pasta");
        assert_eq!(recipe.tags, vec!["contains_dairy".to_string()]);
        assert_eq!(recipe.ingredients.len(), 3);
        assert_eq!(recipe.ingredients[0].quantity, Decimal::from(200));
        assert_eq!(recipe.ingredients[1].volume_unit.as_deref(), Some("tbsp"));
        assert!(recipe.ingredients[2].volume_unit.is_none());
        assert!(recipe.ingredients[2].weight_unit.is_none());
        assert_eq!(recipe.steps[1].step, 2);
    }

    #[test]
    fn test_parse_rejects_both_units() {
        let raw = r#"{"title": "Bad", "ingredients": [
            {"name": "Flour", "quantity": 1, "volume_unit": "cup", "weight_unit": "g"}
        ]}"#;
        let err = parse_generated_recipe(raw).unwrap_err();
        assert_eq!(err.field(), None);
        assert!(err.to_string().contains("units"), "{err}");
    }

    #[test]
    fn test_parse_rejects_unknown_unit() {
        let raw = r#"{"title": "Bad", "ingredients": [
            {"name": "Salt", "quantity": 1, "volume_unit": "pinch"}
        ]}"#;
        match parse_generated_recipe(raw).unwrap_err() {
            Error::Generation { message, raw: reply } => {
                assert!(message.contains("volume_unit"), "{message}");
                assert_eq!(reply.as_deref(), Some(raw));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_failure_keeps_raw_reply() {
        let err = parse_generated_recipe("Sorry, I can't do that").unwrap_err();
        match err {
            Error::Generation { raw, .. } => {
                assert_eq!(raw.as_deref(), Some("Sorry, I can't do that"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_truncates_long_notes() {
        let raw = format!(r#"{{"title": "Long", "notes": "{}"}}"#, "n".repeat(400));
        let recipe = parse_generated_recipe(&raw).unwrap();
        assert_eq!(recipe.notes.chars().count(), RECIPE_NOTES_MAX);
    }

    #[test]
    fn test_generate_recipe_requires_prompt() {
        let generator = CannedGenerator {
            reply: Ok(REPLY.to_string()),
        };
        let err = generate_recipe(&generator, "   ", &[]).unwrap_err();
        assert_eq!(err.field(), Some("prompt"));
    }

    #[test]
    fn test_generate_recipe_with_canned_reply() {
        let generator = CannedGenerator {
            reply: Ok(REPLY.to_string()),
        };
        let recipe = generate_recipe(&generator, "garlic pasta", &[]).unwrap();
        assert_eq!(recipe.title, "Garlic Butter Pasta");
    }

    #[test]
    fn test_generate_recipe_upstream_failure() {
        let generator = CannedGenerator {
            reply: Err(anyhow::anyhow!("connection refused")),
        };
        let err = generate_recipe(&generator, "soup", &[]).unwrap_err();
        assert!(matches!(err, Error::Generation { raw: None, .. }));
        assert!(err.to_string().contains("connection refused"));
    }
}
