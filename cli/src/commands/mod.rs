mod grocery;
mod helpers;
mod recipe;
mod user;

pub(crate) use grocery::{
    cmd_grocery_add, cmd_grocery_check, cmd_grocery_clear, cmd_grocery_import, cmd_grocery_list,
    cmd_grocery_remove,
};
pub(crate) use recipe::{
    cmd_recipe_add_ingredient, cmd_recipe_add_step, cmd_recipe_create, cmd_recipe_delete,
    cmd_recipe_generate, cmd_recipe_list, cmd_recipe_show,
};
pub(crate) use user::{cmd_user_add, cmd_user_show};
