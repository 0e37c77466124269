use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;

use crate::grocery::name_key;
use crate::models::{
    GroceryListItem, Ingredient, NewGroceryItem, NewIngredient, NewRecipe, NewStep, Recipe, Step,
    UpdateRecipe, User,
};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    token_hash TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    notes TEXT NOT NULL DEFAULT '',
                    favorite INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    quantity TEXT NOT NULL,
                    volume_unit TEXT,
                    weight_unit TEXT
                );

                CREATE TABLE IF NOT EXISTS steps (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    step INTEGER NOT NULL,
                    description TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS grocery_list_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    name_key TEXT NOT NULL,
                    quantity TEXT NOT NULL,
                    volume_unit TEXT,
                    weight_unit TEXT,
                    checked INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_user ON recipes(user_id);
                CREATE INDEX IF NOT EXISTS idx_ingredients_recipe ON ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_steps_recipe ON steps(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_grocery_user_name ON grocery_list_items(user_id, name_key);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Run `f` inside one transaction. Any error rolls back every write it made.
    ///
    /// Must not be nested.
    pub fn in_transaction<T, E>(&self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let value = f(self)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(value)
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            notes: row.get(3)?,
            favorite: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            recipe_id: row.get(1)?,
            name: row.get(2)?,
            quantity: decimal_column(row, 3)?,
            volume_unit: row.get(4)?,
            weight_unit: row.get(5)?,
        })
    }

    fn step_from_row(row: &rusqlite::Row) -> rusqlite::Result<Step> {
        Ok(Step {
            id: row.get(0)?,
            recipe_id: row.get(1)?,
            step: row.get(2)?,
            description: row.get(3)?,
        })
    }

    // Expects columns:
    // 0: id, 1: user_id, 2: name, 3: quantity, 4: volume_unit,
    // 5: weight_unit, 6: checked, 7: created_at
    fn grocery_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<GroceryListItem> {
        Ok(GroceryListItem {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            quantity: decimal_column(row, 3)?,
            volume_unit: row.get(4)?,
            weight_unit: row.get(5)?,
            checked: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // --- Users ---

    pub fn insert_user(&self, username: &str, token_hash: &str) -> Result<User> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO users (username, token_hash, created_at) VALUES (?1, ?2, ?3)",
                params![username, token_hash, now],
            )
            .with_context(|| format!("Failed to create user '{username}'"))?;
        let id = self.conn.last_insert_rowid();
        Ok(User {
            id,
            username: username.to_string(),
            created_at: now,
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .optional()?)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE username = ?1",
                params![username],
                Self::user_from_row,
            )
            .optional()?)
    }

    pub fn get_user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE token_hash = ?1",
                params![token_hash],
                Self::user_from_row,
            )
            .optional()?)
    }

    pub fn rename_user(&self, id: i64, username: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET username = ?1 WHERE id = ?2",
            params![username, id],
        )?;
        Ok(rows > 0)
    }

    /// Delete a user. Recipes, ingredients, steps and grocery rows cascade.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Recipes ---

    pub fn insert_recipe(&self, user_id: i64, recipe: &NewRecipe) -> Result<Recipe> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recipes (user_id, title, notes, favorite, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, recipe.title, recipe.notes, recipe.favorite, now, now],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Recipe {
            id,
            user_id,
            title: recipe.title.clone(),
            notes: recipe.notes.clone(),
            favorite: recipe.favorite,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_recipe(&self, user_id: i64, id: i64) -> Result<Option<Recipe>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, title, notes, favorite, created_at, updated_at
                 FROM recipes WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::recipe_from_row,
            )
            .optional()?)
    }

    pub fn list_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, notes, favorite, created_at, updated_at
             FROM recipes WHERE user_id = ?1 ORDER BY julianday(created_at) DESC, id DESC",
        )?;
        let recipes = stmt
            .query_map(params![user_id], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn update_recipe(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateRecipe,
    ) -> Result<Option<Recipe>> {
        if self.get_recipe(user_id, id)?.is_none() {
            return Ok(None);
        }

        let now = Utc::now().to_rfc3339();
        if let Some(ref title) = update.title {
            self.conn.execute(
                "UPDATE recipes SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, now, id],
            )?;
        }
        if let Some(ref notes) = update.notes {
            self.conn.execute(
                "UPDATE recipes SET notes = ?1, updated_at = ?2 WHERE id = ?3",
                params![notes, now, id],
            )?;
        }
        if let Some(favorite) = update.favorite {
            self.conn.execute(
                "UPDATE recipes SET favorite = ?1, updated_at = ?2 WHERE id = ?3",
                params![favorite, now, id],
            )?;
        }

        self.get_recipe(user_id, id)
    }

    /// Delete a recipe owned by `user_id`. Ingredients and steps cascade.
    pub fn delete_recipe(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM recipes WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Ingredients ---

    pub fn insert_ingredient(&self, recipe_id: i64, ingredient: &NewIngredient) -> Result<Ingredient> {
        self.conn.execute(
            "INSERT INTO ingredients (recipe_id, name, quantity, volume_unit, weight_unit)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                recipe_id,
                ingredient.name,
                ingredient.quantity.to_string(),
                ingredient.volume_unit,
                ingredient.weight_unit,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Ingredient {
            id,
            recipe_id,
            name: ingredient.name.clone(),
            quantity: ingredient.quantity,
            volume_unit: ingredient.volume_unit.clone(),
            weight_unit: ingredient.weight_unit.clone(),
        })
    }

    /// Ingredients of a recipe in insertion order.
    pub fn list_ingredients(&self, recipe_id: i64) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recipe_id, name, quantity, volume_unit, weight_unit
             FROM ingredients WHERE recipe_id = ?1 ORDER BY id",
        )?;
        let ingredients = stmt
            .query_map(params![recipe_id], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    pub fn get_ingredient(&self, recipe_id: i64, id: i64) -> Result<Option<Ingredient>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, recipe_id, name, quantity, volume_unit, weight_unit
                 FROM ingredients WHERE id = ?1 AND recipe_id = ?2",
                params![id, recipe_id],
                Self::ingredient_from_row,
            )
            .optional()?)
    }

    pub fn update_ingredient(
        &self,
        recipe_id: i64,
        id: i64,
        ingredient: &NewIngredient,
    ) -> Result<Option<Ingredient>> {
        let rows = self.conn.execute(
            "UPDATE ingredients SET name = ?1, quantity = ?2, volume_unit = ?3, weight_unit = ?4
             WHERE id = ?5 AND recipe_id = ?6",
            params![
                ingredient.name,
                ingredient.quantity.to_string(),
                ingredient.volume_unit,
                ingredient.weight_unit,
                id,
                recipe_id,
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_ingredient(recipe_id, id)
    }

    pub fn delete_ingredient(&self, recipe_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM ingredients WHERE id = ?1 AND recipe_id = ?2",
            params![id, recipe_id],
        )?;
        Ok(rows > 0)
    }

    // --- Steps ---

    pub fn insert_step(&self, recipe_id: i64, step: &NewStep) -> Result<Step> {
        self.conn.execute(
            "INSERT INTO steps (recipe_id, step, description) VALUES (?1, ?2, ?3)",
            params![recipe_id, step.step, step.description],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Step {
            id,
            recipe_id,
            step: step.step,
            description: step.description.clone(),
        })
    }

    /// Steps of a recipe ordered by step number.
    pub fn list_steps(&self, recipe_id: i64) -> Result<Vec<Step>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recipe_id, step, description
             FROM steps WHERE recipe_id = ?1 ORDER BY step, id",
        )?;
        let steps = stmt
            .query_map(params![recipe_id], Self::step_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(steps)
    }

    pub fn update_step(&self, recipe_id: i64, id: i64, step: &NewStep) -> Result<Option<Step>> {
        let rows = self.conn.execute(
            "UPDATE steps SET step = ?1, description = ?2 WHERE id = ?3 AND recipe_id = ?4",
            params![step.step, step.description, id, recipe_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        Ok(Some(Step {
            id,
            recipe_id,
            step: step.step,
            description: step.description.clone(),
        }))
    }

    pub fn delete_step(&self, recipe_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM steps WHERE id = ?1 AND recipe_id = ?2",
            params![id, recipe_id],
        )?;
        Ok(rows > 0)
    }

    // --- Grocery list ---

    /// A user's grocery rows, newest first.
    pub fn list_grocery_items(&self, user_id: i64) -> Result<Vec<GroceryListItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, quantity, volume_unit, weight_unit, checked, created_at
             FROM grocery_list_items WHERE user_id = ?1
             ORDER BY julianday(created_at) DESC, id DESC",
        )?;
        let items = stmt
            .query_map(params![user_id], Self::grocery_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn get_grocery_item(&self, user_id: i64, id: i64) -> Result<Option<GroceryListItem>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, name, quantity, volume_unit, weight_unit, checked, created_at
                 FROM grocery_list_items WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::grocery_item_from_row,
            )
            .optional()?)
    }

    /// Rows whose name matches `name` case-insensitively, oldest first.
    pub fn grocery_items_named(&self, user_id: i64, name: &str) -> Result<Vec<GroceryListItem>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, user_id, name, quantity, volume_unit, weight_unit, checked, created_at
             FROM grocery_list_items WHERE user_id = ?1 AND name_key = ?2
             ORDER BY id",
        )?;
        let items = stmt
            .query_map(params![user_id, name_key(name)], Self::grocery_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn insert_grocery_item(
        &self,
        user_id: i64,
        item: &NewGroceryItem,
    ) -> Result<GroceryListItem> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO grocery_list_items
                (user_id, name, name_key, quantity, volume_unit, weight_unit, checked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                user_id,
                item.name,
                name_key(&item.name),
                item.quantity.to_string(),
                item.volume_unit,
                item.weight_unit,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(GroceryListItem {
            id,
            user_id,
            name: item.name.clone(),
            quantity: item.quantity,
            volume_unit: item.volume_unit.clone(),
            weight_unit: item.weight_unit.clone(),
            checked: false,
            created_at: now,
        })
    }

    /// Write back quantity, units and checked state of an existing row.
    pub fn update_grocery_item(&self, item: &GroceryListItem) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE grocery_list_items
             SET quantity = ?1, volume_unit = ?2, weight_unit = ?3, checked = ?4
             WHERE id = ?5 AND user_id = ?6",
            params![
                item.quantity.to_string(),
                item.volume_unit,
                item.weight_unit,
                item.checked,
                item.id,
                item.user_id,
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_grocery_item(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM grocery_list_items WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    /// Delete every checked row of a user, returning how many were removed.
    pub fn delete_checked_grocery_items(&self, user_id: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM grocery_list_items WHERE user_id = ?1 AND checked = 1",
            params![user_id],
        )?;
        Ok(rows)
    }
}

/// Read a decimal stored as TEXT.
fn decimal_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    text.parse::<Decimal>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
