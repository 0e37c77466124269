use std::collections::HashSet;
use std::path::Path;

use anyhow::anyhow;

use crate::auth::{generate_token, hash_token};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::generate::GeneratedRecipe;
use crate::grocery::{
    GroceryIndex, MergeOutcome, MergePlan, apply_patch, cleanup_message, import_message,
    manual_add_message, name_key, validate_manual_add,
};
use crate::models::{
    CleanupSummary, GroceryImportSummary, GroceryItemPatch, GroceryListItem, GroceryResult,
    Ingredient, ManualAddInput, NewIngredient, NewRecipe, NewStep, Recipe, RecipeDetail, Step,
    UpdateRecipe, User, validate_new_ingredient, validate_new_recipe, validate_new_step,
    validate_update_recipe, validate_username,
};

/// Owner-scoped operations over recipes and the grocery list.
///
/// Every method takes the acting user's id; rows owned by someone else are
/// reported as [`Error::NotFound`].
pub struct RecipeService {
    db: Database,
}

impl RecipeService {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::open(path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Users ---

    /// Create a user and return it with its bearer token. The token is not
    /// stored and cannot be recovered later.
    pub fn create_user(&self, username: &str) -> Result<(User, String)> {
        let username = validate_username(username)?;
        if self.db.get_user_by_username(&username)?.is_some() {
            return Err(Error::validation("username", "Username is already taken."));
        }
        let token = generate_token();
        let user = self.db.insert_user(&username, &hash_token(&token))?;
        tracing::info!(user_id = user.id, username = %user.username, "created user");
        Ok((user, token))
    }

    pub fn authenticate(&self, token: &str) -> Result<Option<User>> {
        Ok(self.db.get_user_by_token_hash(&hash_token(token))?)
    }

    /// Look up a user by name, creating it on first use.
    pub fn get_or_create_user(&self, username: &str) -> Result<User> {
        let username = validate_username(username)?;
        if let Some(user) = self.db.get_user_by_username(&username)? {
            return Ok(user);
        }
        let (user, _token) = self.create_user(&username)?;
        Ok(user)
    }

    pub fn get_user(&self, user_id: i64) -> Result<User> {
        self.db
            .get_user(user_id)?
            .ok_or_else(|| Error::not_found("User"))
    }

    pub fn rename_user(&self, user_id: i64, username: &str) -> Result<User> {
        let username = validate_username(username)?;
        if let Some(other) = self.db.get_user_by_username(&username)? {
            if other.id != user_id {
                return Err(Error::validation("username", "Username is already taken."));
            }
        }
        if !self.db.rename_user(user_id, &username)? {
            return Err(Error::not_found("User"));
        }
        self.get_user(user_id)
    }

    /// Delete a user together with all of their recipes and grocery rows.
    pub fn delete_user(&self, user_id: i64) -> Result<()> {
        self.db.in_transaction(|db| {
            if !db.delete_user(user_id)? {
                return Err(Error::not_found("User"));
            }
            Ok(())
        })?;
        tracing::info!(user_id, "deleted user");
        Ok(())
    }

    // --- Recipes ---

    pub fn create_recipe(&self, user_id: i64, recipe: &NewRecipe) -> Result<Recipe> {
        let recipe = validate_new_recipe(recipe)?;
        Ok(self.db.insert_recipe(user_id, &recipe)?)
    }

    pub fn list_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        Ok(self.db.list_recipes(user_id)?)
    }

    pub fn get_recipe(&self, user_id: i64, recipe_id: i64) -> Result<Recipe> {
        owned_recipe(&self.db, user_id, recipe_id)
    }

    pub fn get_recipe_detail(&self, user_id: i64, recipe_id: i64) -> Result<RecipeDetail> {
        recipe_detail(&self.db, user_id, recipe_id)
    }

    pub fn update_recipe(
        &self,
        user_id: i64,
        recipe_id: i64,
        update: &UpdateRecipe,
    ) -> Result<Recipe> {
        let update = validate_update_recipe(update)?;
        self.db
            .update_recipe(user_id, recipe_id, &update)?
            .ok_or_else(|| Error::not_found("Recipe"))
    }

    pub fn delete_recipe(&self, user_id: i64, recipe_id: i64) -> Result<()> {
        if !self.db.delete_recipe(user_id, recipe_id)? {
            return Err(Error::not_found("Recipe"));
        }
        Ok(())
    }

    // --- Ingredients ---

    pub fn add_ingredient(
        &self,
        user_id: i64,
        recipe_id: i64,
        ingredient: &NewIngredient,
    ) -> Result<Ingredient> {
        owned_recipe(&self.db, user_id, recipe_id)?;
        let ingredient = validate_new_ingredient(ingredient)?;
        Ok(self.db.insert_ingredient(recipe_id, &ingredient)?)
    }

    pub fn list_ingredients(&self, user_id: i64, recipe_id: i64) -> Result<Vec<Ingredient>> {
        owned_recipe(&self.db, user_id, recipe_id)?;
        Ok(self.db.list_ingredients(recipe_id)?)
    }

    pub fn update_ingredient(
        &self,
        user_id: i64,
        recipe_id: i64,
        ingredient_id: i64,
        ingredient: &NewIngredient,
    ) -> Result<Ingredient> {
        owned_recipe(&self.db, user_id, recipe_id)?;
        let ingredient = validate_new_ingredient(ingredient)?;
        self.db
            .update_ingredient(recipe_id, ingredient_id, &ingredient)?
            .ok_or_else(|| Error::not_found("Ingredient"))
    }

    pub fn delete_ingredient(&self, user_id: i64, recipe_id: i64, ingredient_id: i64) -> Result<()> {
        owned_recipe(&self.db, user_id, recipe_id)?;
        if !self.db.delete_ingredient(recipe_id, ingredient_id)? {
            return Err(Error::not_found("Ingredient"));
        }
        Ok(())
    }

    // --- Steps ---

    pub fn add_step(&self, user_id: i64, recipe_id: i64, step: &NewStep) -> Result<Step> {
        owned_recipe(&self.db, user_id, recipe_id)?;
        let step = validate_new_step(step)?;
        Ok(self.db.insert_step(recipe_id, &step)?)
    }

    pub fn list_steps(&self, user_id: i64, recipe_id: i64) -> Result<Vec<Step>> {
        owned_recipe(&self.db, user_id, recipe_id)?;
        Ok(self.db.list_steps(recipe_id)?)
    }

    pub fn update_step(
        &self,
        user_id: i64,
        recipe_id: i64,
        step_id: i64,
        step: &NewStep,
    ) -> Result<Step> {
        owned_recipe(&self.db, user_id, recipe_id)?;
        let step = validate_new_step(step)?;
        self.db
            .update_step(recipe_id, step_id, &step)?
            .ok_or_else(|| Error::not_found("Step"))
    }

    pub fn delete_step(&self, user_id: i64, recipe_id: i64, step_id: i64) -> Result<()> {
        owned_recipe(&self.db, user_id, recipe_id)?;
        if !self.db.delete_step(recipe_id, step_id)? {
            return Err(Error::not_found("Step"));
        }
        Ok(())
    }

    /// Store a generated recipe with its ingredients and steps, all or nothing.
    pub fn save_generated_recipe(
        &self,
        user_id: i64,
        generated: &GeneratedRecipe,
    ) -> Result<RecipeDetail> {
        let recipe = validate_new_recipe(&generated.to_new_recipe())?;
        let ingredients = generated
            .ingredients
            .iter()
            .map(validate_new_ingredient)
            .collect::<Result<Vec<_>>>()?;
        let steps = generated
            .steps
            .iter()
            .map(validate_new_step)
            .collect::<Result<Vec<_>>>()?;

        let detail = self.db.in_transaction(|db| {
            let recipe = db.insert_recipe(user_id, &recipe)?;
            let ingredients = ingredients
                .iter()
                .map(|i| db.insert_ingredient(recipe.id, i))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let steps = steps
                .iter()
                .map(|s| db.insert_step(recipe.id, s))
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok::<_, Error>(RecipeDetail {
                recipe,
                ingredients,
                steps,
            })
        })?;
        tracing::info!(
            user_id,
            recipe_id = detail.recipe.id,
            "saved generated recipe"
        );
        Ok(detail)
    }

    // --- Grocery list ---

    pub fn list_grocery_items(&self, user_id: i64) -> Result<Vec<GroceryListItem>> {
        Ok(self.db.list_grocery_items(user_id)?)
    }

    /// Merge every ingredient of a recipe into the user's grocery list.
    ///
    /// Rows match on name and identical units. Nothing is written when the
    /// recipe is missing or any merge fails.
    pub fn import_recipe_ingredients(
        &self,
        user_id: i64,
        recipe_id: i64,
    ) -> Result<GroceryImportSummary> {
        let summary = self.db.in_transaction(|db| {
            owned_recipe(db, user_id, recipe_id)?;
            let ingredients = db.list_ingredients(recipe_id)?;

            let mut seen = HashSet::new();
            let mut existing = Vec::new();
            for ingredient in &ingredients {
                if seen.insert(name_key(&ingredient.name)) {
                    existing.extend(db.grocery_items_named(user_id, &ingredient.name)?);
                }
            }

            let mut index = GroceryIndex::new(existing);
            let (mut created, mut updated) = (0, 0);
            for ingredient in &ingredients {
                match index.merge_exact(ingredient)? {
                    MergeOutcome::Created => created += 1,
                    MergeOutcome::Updated => updated += 1,
                }
            }
            persist_plan(db, user_id, index.into_plan())?;

            Ok::<_, Error>(GroceryImportSummary {
                message: import_message(created, updated),
                created,
                updated,
            })
        })?;
        tracing::info!(
            user_id,
            recipe_id,
            created = summary.created,
            updated = summary.updated,
            "imported recipe into grocery list"
        );
        Ok(summary)
    }

    /// Add a typed item, merging into a same-name row of the same category.
    pub fn add_grocery_item(&self, user_id: i64, input: &ManualAddInput) -> Result<GroceryResult> {
        let incoming = validate_manual_add(input)?;
        self.db.in_transaction(|db| {
            let mut index = GroceryIndex::new(db.grocery_items_named(user_id, &incoming.name)?);
            let outcome = index.merge_by_category(&incoming)?;
            let item = persist_plan(db, user_id, index.into_plan())?
                .pop()
                .ok_or_else(|| anyhow!("Grocery merge produced no rows"))?;
            Ok::<_, Error>(GroceryResult {
                message: manual_add_message(&item.name, outcome),
                item: Some(item),
                created: outcome == MergeOutcome::Created,
            })
        })
    }

    /// Overwrite the fields present in `patch`.
    pub fn patch_grocery_item(
        &self,
        user_id: i64,
        item_id: i64,
        patch: &GroceryItemPatch,
    ) -> Result<GroceryResult> {
        let mut item = self
            .db
            .get_grocery_item(user_id, item_id)?
            .ok_or_else(|| Error::not_found("Grocery item"))?;
        apply_patch(&mut item, patch);
        self.db.update_grocery_item(&item)?;
        Ok(GroceryResult {
            message: format!("Updated grocery list item for {}.", item.name),
            item: Some(item),
            created: false,
        })
    }

    pub fn delete_grocery_item(&self, user_id: i64, item_id: i64) -> Result<()> {
        if !self.db.delete_grocery_item(user_id, item_id)? {
            return Err(Error::not_found("Grocery item"));
        }
        Ok(())
    }

    /// Remove every checked item. Removing nothing is not an error.
    pub fn remove_checked_items(&self, user_id: i64) -> Result<CleanupSummary> {
        let removed = self
            .db
            .in_transaction(|db| db.delete_checked_grocery_items(user_id))?;
        tracing::info!(user_id, removed, "removed checked grocery items");
        Ok(CleanupSummary {
            message: cleanup_message(removed),
            removed,
        })
    }
}

fn owned_recipe(db: &Database, user_id: i64, recipe_id: i64) -> Result<Recipe> {
    db.get_recipe(user_id, recipe_id)?
        .ok_or_else(|| Error::not_found("Recipe"))
}

fn recipe_detail(db: &Database, user_id: i64, recipe_id: i64) -> Result<RecipeDetail> {
    let recipe = owned_recipe(db, user_id, recipe_id)?;
    Ok(RecipeDetail {
        ingredients: db.list_ingredients(recipe.id)?,
        steps: db.list_steps(recipe.id)?,
        recipe,
    })
}

/// Write a merge plan, returning the touched rows (inserts first).
fn persist_plan(db: &Database, user_id: i64, plan: MergePlan) -> Result<Vec<GroceryListItem>> {
    let mut rows = Vec::with_capacity(plan.creates.len() + plan.updates.len());
    for new in &plan.creates {
        rows.push(db.insert_grocery_item(user_id, new)?);
    }
    for item in plan.updates {
        db.update_grocery_item(&item)?;
        rows.push(item);
    }
    Ok(rows)
}
