use std::sync::Arc;

use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use recipebox_core::generate::{self, GeneratedRecipe, RecipeGenerator};
use recipebox_core::models::{
    Ingredient, NewIngredient, NewRecipe, NewStep, Recipe, User, parse_quantity,
};
use recipebox_core::service::RecipeService;

use super::helpers::{format_quantity, print_json, split_unit, truncate};

pub(crate) fn cmd_recipe_create(
    service: &RecipeService,
    user: &User,
    title: &str,
    notes: Option<String>,
    favorite: bool,
    json: bool,
) -> Result<()> {
    let recipe = service.create_recipe(
        user.id,
        &NewRecipe {
            title: title.to_string(),
            notes: notes.unwrap_or_default(),
            favorite,
        },
    )?;
    if json {
        return print_json(&recipe);
    }
    let id = recipe.id;
    let title = &recipe.title;
    println!("Created recipe: {title} (id: {id})");
    println!("Add ingredients with: recipebox recipe add-ingredient {id} <name> <quantity> --unit <unit>");
    Ok(())
}

pub(crate) fn cmd_recipe_list(service: &RecipeService, user: &User, json: bool) -> Result<()> {
    let recipes = service.list_recipes(user.id)?;
    if json {
        return print_json(&recipes);
    }
    if recipes.is_empty() {
        println!("No recipes yet. Create one with: recipebox recipe create <title>");
        return Ok(());
    }
    print_recipe_table(&recipes);
    Ok(())
}

fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Fav")]
        favorite: &'static str,
        #[tabled(rename = "Notes")]
        notes: String,
        #[tabled(rename = "Updated")]
        updated: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            title: truncate(&r.title, 40),
            favorite: if r.favorite { "*" } else { "" },
            notes: truncate(&r.notes, 40),
            updated: r.updated_at.clone(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn cmd_recipe_show(
    service: &RecipeService,
    user: &User,
    recipe_id: i64,
    json: bool,
) -> Result<()> {
    let detail = service.get_recipe_detail(user.id, recipe_id)?;
    if json {
        return print_json(&detail);
    }

    let title = &detail.recipe.title;
    let star = if detail.recipe.favorite { " *" } else { "" };
    println!("=== {title}{star} ===");
    if !detail.recipe.notes.is_empty() {
        println!("  {}", detail.recipe.notes);
    }

    println!("\n  INGREDIENTS:");
    if detail.ingredients.is_empty() {
        println!("    (none)");
    }
    print_ingredient_lines(&detail.ingredients);

    println!("\n  STEPS:");
    if detail.steps.is_empty() {
        println!("    (none)");
    }
    for step in &detail.steps {
        println!("    {}. {}", step.step, step.description);
    }
    Ok(())
}

fn print_ingredient_lines(ingredients: &[Ingredient]) {
    for ing in ingredients {
        let qty = format_quantity(
            ing.quantity,
            ing.volume_unit.as_deref(),
            ing.weight_unit.as_deref(),
        );
        println!("    {qty:>12}  {}", ing.name);
    }
}

pub(crate) fn cmd_recipe_delete(
    service: &RecipeService,
    user: &User,
    recipe_id: i64,
    json: bool,
) -> Result<()> {
    service.delete_recipe(user.id, recipe_id)?;
    if json {
        return print_json(&serde_json::json!({ "deleted": recipe_id }));
    }
    println!("Deleted recipe {recipe_id}");
    Ok(())
}

pub(crate) fn cmd_recipe_add_ingredient(
    service: &RecipeService,
    user: &User,
    recipe_id: i64,
    name: &str,
    quantity: &str,
    unit: Option<&str>,
    json: bool,
) -> Result<()> {
    let quantity = parse_quantity(quantity)
        .with_context(|| format!("Invalid quantity '{quantity}'. Use a number like 2 or 0.5"))?;
    let (volume_unit, weight_unit) = split_unit(unit)?;
    let ingredient = service.add_ingredient(
        user.id,
        recipe_id,
        &NewIngredient {
            name: name.to_string(),
            quantity,
            volume_unit,
            weight_unit,
        },
    )?;
    if json {
        return print_json(&ingredient);
    }
    let qty = format_quantity(
        ingredient.quantity,
        ingredient.volume_unit.as_deref(),
        ingredient.weight_unit.as_deref(),
    );
    println!("Added {qty} {} to recipe {recipe_id}", ingredient.name);
    Ok(())
}

pub(crate) fn cmd_recipe_add_step(
    service: &RecipeService,
    user: &User,
    recipe_id: i64,
    step: i64,
    description: &str,
    json: bool,
) -> Result<()> {
    let step = service.add_step(
        user.id,
        recipe_id,
        &NewStep {
            step,
            description: description.to_string(),
        },
    )?;
    if json {
        return print_json(&step);
    }
    println!("Added step {} to recipe {recipe_id}", step.step);
    Ok(())
}

pub(crate) async fn cmd_recipe_generate(
    service: &RecipeService,
    generator: Arc<dyn RecipeGenerator>,
    user: &User,
    prompt: String,
    tags: Vec<String>,
    save: bool,
    json: bool,
) -> Result<()> {
    eprintln!("Generating recipe...");
    let generated = tokio::task::spawn_blocking(move || {
        generate::generate_recipe(generator.as_ref(), &prompt, &tags)
    })
    .await
    .context("Recipe generation task failed")??;

    if save {
        let detail = service.save_generated_recipe(user.id, &generated)?;
        if json {
            return print_json(&detail);
        }
        let id = detail.recipe.id;
        println!("Saved recipe: {} (id: {id})", detail.recipe.title);
        return Ok(());
    }

    if json {
        return print_json(&generated);
    }
    print_generated(&generated);
    println!("\nRun again with --save to keep it.");
    Ok(())
}

fn print_generated(recipe: &GeneratedRecipe) {
    println!("=== {} ===", recipe.title);
    if !recipe.notes.is_empty() {
        println!("  {}", recipe.notes);
    }
    if !recipe.tags.is_empty() {
        println!("  Tags: {}", recipe.tags.join(", "));
    }

    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Ingredient")]
        name: String,
    }

    let rows: Vec<IngredientRow> = recipe
        .ingredients
        .iter()
        .map(|ing| IngredientRow {
            quantity: format_quantity(
                ing.quantity,
                ing.volume_unit.as_deref(),
                ing.weight_unit.as_deref(),
            ),
            name: ing.name.clone(),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::right()))
        .to_string();
    println!("{table}");

    for step in &recipe.steps {
        println!("  {}. {}", step.step, step.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedGenerator;

    impl RecipeGenerator for CannedGenerator {
        fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            Ok(r#"```json
{"title": "Pancakes", "notes": "", "tags": [],
 "ingredients": [{"name": "Flour", "quantity": 1.5, "volume_unit": "cup", "weight_unit": null}],
 "steps": [{"step": 1, "description": "Whisk and fry."}]}
```"#
                .to_string())
        }
    }

    fn setup() -> (RecipeService, User) {
        let service = RecipeService::new_in_memory().unwrap();
        let user = service.get_or_create_user("local").unwrap();
        (service, user)
    }

    #[test]
    fn test_add_ingredient_splits_unit() {
        let (service, user) = setup();
        cmd_recipe_create(&service, &user, "Bread", None, false, true).unwrap();
        let recipe = service.list_recipes(user.id).unwrap().remove(0);

        cmd_recipe_add_ingredient(&service, &user, recipe.id, "Flour", "500", Some("g"), true)
            .unwrap();
        let ingredients = service.list_ingredients(user.id, recipe.id).unwrap();
        assert_eq!(ingredients[0].weight_unit.as_deref(), Some("g"));
        assert_eq!(ingredients[0].volume_unit, None);
    }

    #[test]
    fn test_add_ingredient_rejects_bad_quantity() {
        let (service, user) = setup();
        cmd_recipe_create(&service, &user, "Bread", None, false, true).unwrap();
        let recipe = service.list_recipes(user.id).unwrap().remove(0);
        let err =
            cmd_recipe_add_ingredient(&service, &user, recipe.id, "Flour", "lots", None, true)
                .unwrap_err();
        assert!(err.to_string().contains("Invalid quantity"));
    }

    #[tokio::test]
    async fn test_generate_and_save() {
        let (service, user) = setup();
        let generator: Arc<dyn RecipeGenerator> = Arc::new(CannedGenerator);
        cmd_recipe_generate(
            &service,
            generator,
            &user,
            "pancakes".to_string(),
            vec![],
            true,
            true,
        )
        .await
        .unwrap();

        let recipes = service.list_recipes(user.id).unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].title, "Pancakes");
    }
}
