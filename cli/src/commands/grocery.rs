use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use recipebox_core::models::{GroceryItemPatch, GroceryListItem, ManualAddInput, User};
use recipebox_core::service::RecipeService;

use super::helpers::{check_mark, format_quantity, print_json, split_unit, truncate};

pub(crate) fn cmd_grocery_list(service: &RecipeService, user: &User, json: bool) -> Result<()> {
    let items = service.list_grocery_items(user.id)?;
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("Grocery list is empty.");
        return Ok(());
    }
    print_grocery_table(&items);
    Ok(())
}

fn print_grocery_table(items: &[GroceryListItem]) {
    #[derive(Tabled)]
    struct GroceryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Done")]
        checked: &'static str,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Kind")]
        category: String,
    }

    let rows: Vec<GroceryRow> = items
        .iter()
        .map(|item| GroceryRow {
            id: item.id,
            checked: check_mark(item.checked),
            name: truncate(&item.name, 35),
            quantity: format_quantity(
                item.quantity,
                item.volume_unit.as_deref(),
                item.weight_unit.as_deref(),
            ),
            category: item.category().to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_grocery_add(
    service: &RecipeService,
    user: &User,
    name: &str,
    quantity: &str,
    unit: Option<&str>,
    json: bool,
) -> Result<()> {
    let (volume_unit, weight_unit) = split_unit(unit)?;
    let result = service.add_grocery_item(
        user.id,
        &ManualAddInput {
            name: Some(name.to_string()),
            quantity: Some(quantity.to_string()),
            volume_unit,
            weight_unit,
        },
    )?;
    if json {
        return print_json(&result);
    }
    println!("{}", result.message);
    if let Some(item) = &result.item {
        let qty = format_quantity(
            item.quantity,
            item.volume_unit.as_deref(),
            item.weight_unit.as_deref(),
        );
        println!("  {}: {qty}", item.name);
    }
    Ok(())
}

pub(crate) fn cmd_grocery_import(
    service: &RecipeService,
    user: &User,
    recipe_id: i64,
    json: bool,
) -> Result<()> {
    let summary = service.import_recipe_ingredients(user.id, recipe_id)?;
    if json {
        return print_json(&summary);
    }
    println!("{}", summary.message);
    Ok(())
}

pub(crate) fn cmd_grocery_check(
    service: &RecipeService,
    user: &User,
    item_id: i64,
    checked: bool,
    json: bool,
) -> Result<()> {
    let patch = GroceryItemPatch {
        checked: Some(checked),
        ..GroceryItemPatch::default()
    };
    let result = service.patch_grocery_item(user.id, item_id, &patch)?;
    if json {
        return print_json(&result);
    }
    let state = if checked { "Checked" } else { "Unchecked" };
    if let Some(item) = &result.item {
        println!("{state} {}", item.name);
    }
    Ok(())
}

pub(crate) fn cmd_grocery_remove(
    service: &RecipeService,
    user: &User,
    item_id: i64,
    json: bool,
) -> Result<()> {
    service.delete_grocery_item(user.id, item_id)?;
    if json {
        return print_json(&serde_json::json!({ "deleted": item_id }));
    }
    println!("Removed grocery item {item_id}");
    Ok(())
}

pub(crate) fn cmd_grocery_clear(service: &RecipeService, user: &User, json: bool) -> Result<()> {
    let summary = service.remove_checked_items(user.id)?;
    if json {
        return print_json(&summary);
    }
    println!("{}", summary.message);
    Ok(())
}
