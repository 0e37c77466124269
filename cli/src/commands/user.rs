use anyhow::Result;
use serde_json::json;

use recipebox_core::models::User;
use recipebox_core::service::RecipeService;

use super::helpers::print_json;

pub(crate) fn cmd_user_add(service: &RecipeService, username: &str, json: bool) -> Result<()> {
    let (user, token) = service.create_user(username)?;
    if json {
        return print_json(&json!({ "user": user, "token": token }));
    }
    let name = &user.username;
    let id = user.id;
    println!("Created user {name} (id: {id})");
    println!("API token (shown once, store it somewhere safe):\n\n  {token}\n");
    println!("Send it with every request: Authorization: Bearer <token>");
    Ok(())
}

pub(crate) fn cmd_user_show(user: &User, json: bool) -> Result<()> {
    if json {
        return print_json(user);
    }
    let name = &user.username;
    let id = user.id;
    let created = &user.created_at;
    println!("{name} (id: {id}, created {created})");
    Ok(())
}
