use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::units::{Category, VolumeUnit, WeightUnit, present};

pub const RECIPE_TITLE_MAX: usize = 100;
pub const RECIPE_NOTES_MAX: usize = 250;
pub const INGREDIENT_NAME_MAX: usize = 100;
pub const STEP_DESCRIPTION_MAX: usize = 250;
pub const USERNAME_MIN: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub title: String,
    pub notes: String,
    pub favorite: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRecipe {
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub favorite: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRecipe {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub favorite: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ingredient {
    pub id: i64,
    pub recipe_id: i64,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub volume_unit: Option<String>,
    pub weight_unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub quantity: Decimal,
    #[serde(default)]
    pub volume_unit: Option<String>,
    #[serde(default)]
    pub weight_unit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub id: i64,
    pub recipe_id: i64,
    pub step: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStep {
    pub step: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
}

// --- Grocery list types ---

#[derive(Debug, Clone, Serialize)]
pub struct GroceryListItem {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub name: String,
    #[serde(serialize_with = "serialize_display_quantity")]
    pub quantity: Decimal,
    pub volume_unit: Option<String>,
    pub weight_unit: Option<String>,
    pub checked: bool,
    pub created_at: String,
}

impl GroceryListItem {
    #[must_use]
    pub fn category(&self) -> Category {
        Category::classify(self.volume_unit.as_deref(), self.weight_unit.as_deref())
    }
}

/// A grocery row that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroceryItem {
    pub name: String,
    pub quantity: Decimal,
    pub volume_unit: Option<String>,
    pub weight_unit: Option<String>,
}

/// Field-level overwrite of a grocery row. Absent fields stay untouched.
///
/// The unit fields are double options so a caller can clear a unit
/// (`Some(None)`) as well as leave it alone (`None`).
#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct GroceryItemPatch {
    pub checked: Option<bool>,
    pub quantity: Option<Decimal>,
    pub volume_unit: Option<Option<String>>,
    pub weight_unit: Option<Option<String>>,
}

/// Raw user input for a manual grocery-list add, before validation.
#[derive(Debug, Clone, Default)]
pub struct ManualAddInput {
    pub name: Option<String>,
    pub quantity: Option<String>,
    pub volume_unit: Option<String>,
    pub weight_unit: Option<String>,
}

/// Caller-facing result of a single-item grocery mutation.
#[derive(Debug, Clone, Serialize)]
pub struct GroceryResult {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<GroceryListItem>,
    /// True when a new row was created rather than merged into an existing one.
    #[serde(skip)]
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroceryImportSummary {
    pub message: String,
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupSummary {
    pub message: String,
    pub removed: usize,
}

fn serialize_display_quantity<S: Serializer>(
    quantity: &Decimal,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    rust_decimal::serde::float::serialize(&quantity.round_dp(2), serializer)
}

// --- Validation ---

/// Parse user-typed quantity text into a decimal.
#[must_use]
pub fn parse_quantity(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

/// Trim a unit and map blank values to `None`.
#[must_use]
pub fn normalize_unit(unit: Option<&str>) -> Option<String> {
    present(unit).map(|u| u.trim().to_string())
}

pub fn validate_new_recipe(recipe: &NewRecipe) -> Result<NewRecipe> {
    let title = validate_title(&recipe.title)?;
    let notes = validate_notes(&recipe.notes)?;
    Ok(NewRecipe {
        title,
        notes,
        favorite: recipe.favorite,
    })
}

pub fn validate_update_recipe(update: &UpdateRecipe) -> Result<UpdateRecipe> {
    Ok(UpdateRecipe {
        title: update.title.as_deref().map(validate_title).transpose()?,
        notes: update.notes.as_deref().map(validate_notes).transpose()?,
        favorite: update.favorite,
    })
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::validation("title", "Title is required."));
    }
    if title.chars().count() > RECIPE_TITLE_MAX {
        return Err(Error::validation(
            "title",
            format!("Title must be at most {RECIPE_TITLE_MAX} characters."),
        ));
    }
    Ok(title.to_string())
}

fn validate_notes(notes: &str) -> Result<String> {
    let notes = notes.trim();
    if notes.chars().count() > RECIPE_NOTES_MAX {
        return Err(Error::validation(
            "notes",
            format!("Notes must be at most {RECIPE_NOTES_MAX} characters."),
        ));
    }
    Ok(notes.to_string())
}

/// Validate an ingredient and return it with trimmed name and normalized units.
pub fn validate_new_ingredient(ingredient: &NewIngredient) -> Result<NewIngredient> {
    let name = ingredient.name.trim();
    if name.is_empty() {
        return Err(Error::validation("name", "Name is required."));
    }
    if name.chars().count() > INGREDIENT_NAME_MAX {
        return Err(Error::validation(
            "name",
            format!("Name must be at most {INGREDIENT_NAME_MAX} characters."),
        ));
    }
    if ingredient.quantity <= Decimal::ZERO {
        return Err(Error::validation(
            "quantity",
            "Quantity must be greater than 0.",
        ));
    }
    let volume_unit = normalize_unit(ingredient.volume_unit.as_deref());
    let weight_unit = normalize_unit(ingredient.weight_unit.as_deref());
    validate_unit_pair(volume_unit.as_deref(), weight_unit.as_deref())?;
    Ok(NewIngredient {
        name: name.to_string(),
        quantity: ingredient.quantity,
        volume_unit,
        weight_unit,
    })
}

/// At most one unit kind, and the populated one must be in its table.
pub fn validate_unit_pair(volume_unit: Option<&str>, weight_unit: Option<&str>) -> Result<()> {
    match (present(volume_unit), present(weight_unit)) {
        (Some(_), Some(_)) => Err(Error::validation(
            "units",
            "Provide either a volume unit or a weight unit, not both.",
        )),
        (Some(v), None) if VolumeUnit::from_symbol(v).is_none() => {
            Err(Error::validation("volume_unit", "Invalid volume unit."))
        }
        (None, Some(w)) if WeightUnit::from_symbol(w).is_none() => {
            Err(Error::validation("weight_unit", "Invalid weight unit."))
        }
        _ => Ok(()),
    }
}

pub fn validate_new_step(step: &NewStep) -> Result<NewStep> {
    if step.step < 1 {
        return Err(Error::validation("step", "Step number must be at least 1."));
    }
    let description = step.description.trim();
    if description.is_empty() {
        return Err(Error::validation("description", "Description is required."));
    }
    if description.chars().count() > STEP_DESCRIPTION_MAX {
        return Err(Error::validation(
            "description",
            format!("Description must be at most {STEP_DESCRIPTION_MAX} characters."),
        ));
    }
    Ok(NewStep {
        step: step.step,
        description: description.to_string(),
    })
}

pub fn validate_username(username: &str) -> Result<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::validation("username", "Username is required."));
    }
    if username.chars().count() < USERNAME_MIN {
        return Err(Error::validation(
            "username",
            format!("Username must be at least {USERNAME_MIN} characters."),
        ));
    }
    Ok(username.to_string())
}
