mod commands;
mod config;
mod logging;
mod openai;
mod server;

use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{
    cmd_grocery_add, cmd_grocery_check, cmd_grocery_clear, cmd_grocery_import, cmd_grocery_list,
    cmd_grocery_remove, cmd_recipe_add_ingredient, cmd_recipe_add_step, cmd_recipe_create,
    cmd_recipe_delete, cmd_recipe_generate, cmd_recipe_list, cmd_recipe_show, cmd_user_add,
    cmd_user_show,
};
use crate::config::Config;
use crate::logging::LogFormat;
use crate::openai::OpenAiClient;
use recipebox_core::generate::RecipeGenerator;
use recipebox_core::service::RecipeService;

#[derive(Parser)]
#[command(
    name = "recipebox",
    version,
    about = "Recipes and a grocery list that merges itself",
    long_about = "Keep recipes, send their ingredients to a grocery list that merges \
                  duplicates across units, and serve it all over a small REST API."
)]
struct Cli {
    /// Act as this user (created on first use)
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable token authentication; every request acts as the local user
        #[arg(long)]
        no_auth: bool,
    },
    /// Manage users and API tokens
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Manage the grocery list
    Grocery {
        #[command(subcommand)]
        command: GroceryCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user and print its API token
    Add {
        /// Username (at least 3 characters)
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the current user
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create an empty recipe
    Create {
        /// Recipe title
        title: String,
        /// Short notes
        #[arg(long)]
        notes: Option<String>,
        /// Mark as favorite
        #[arg(long)]
        favorite: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe with its ingredients and steps
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient to a recipe
    AddIngredient {
        /// Recipe ID
        recipe: i64,
        /// Ingredient name
        name: String,
        /// Quantity (e.g. 2, 0.5)
        quantity: String,
        /// Unit symbol (tsp, tbsp, fl_oz, cup, pt, qt, gal, ml, l, g, kg, oz, lb); omit for a count
        #[arg(short, long)]
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a numbered step to a recipe
    AddStep {
        /// Recipe ID
        recipe: i64,
        /// Step number (1 or more)
        step: i64,
        /// What to do
        description: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a recipe from a prompt (needs OPENAI_API_KEY)
    Generate {
        /// What to cook
        prompt: String,
        /// Dietary tag, repeatable (e.g. --tag vegan --tag gluten-free)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Save the generated recipe
        #[arg(long)]
        save: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GroceryCommands {
    /// Show the grocery list
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an item, merging into a same-name item of the same kind
    Add {
        /// Item name
        name: String,
        /// Quantity (e.g. 2, 0.5)
        quantity: String,
        /// Unit symbol; omit for a count
        #[arg(short, long)]
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add every ingredient of a recipe
    Import {
        /// Recipe ID
        recipe: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an item as bought
    Check {
        /// Grocery item ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an item as not bought
    Uncheck {
        /// Grocery item ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove one item
    Remove {
        /// Grocery item ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every checked item
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    logging::init(LogFormat::from_env());
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn openai_generator(config: &Config) -> Result<Arc<dyn RecipeGenerator>> {
    Ok(Arc::new(OpenAiClient::new(&config.openai)?))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let service = RecipeService::open(&config.db_path)?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            tracing::info!(data_dir = %config.data_dir.display(), "using data directory");
            let generator = match openai_generator(&config) {
                Ok(generator) => Some(generator),
                Err(err) => {
                    tracing::debug!(error = %err, "generation client unavailable");
                    None
                }
            };
            server::start_server(service, port, &bind, no_auth, generator).await
        }
        Commands::User { command } => match command {
            UserCommands::Add { name, json } => cmd_user_add(&service, &name, json),
            UserCommands::Show { json } => {
                let user = service.get_or_create_user(&cli.user)?;
                cmd_user_show(&user, json)
            }
        },
        Commands::Recipe { command } => {
            let user = service.get_or_create_user(&cli.user)?;
            match command {
                RecipeCommands::Create {
                    title,
                    notes,
                    favorite,
                    json,
                } => cmd_recipe_create(&service, &user, &title, notes, favorite, json),
                RecipeCommands::List { json } => cmd_recipe_list(&service, &user, json),
                RecipeCommands::Show { id, json } => cmd_recipe_show(&service, &user, id, json),
                RecipeCommands::Delete { id, json } => cmd_recipe_delete(&service, &user, id, json),
                RecipeCommands::AddIngredient {
                    recipe,
                    name,
                    quantity,
                    unit,
                    json,
                } => cmd_recipe_add_ingredient(
                    &service,
                    &user,
                    recipe,
                    &name,
                    &quantity,
                    unit.as_deref(),
                    json,
                ),
                RecipeCommands::AddStep {
                    recipe,
                    step,
                    description,
                    json,
                } => cmd_recipe_add_step(&service, &user, recipe, step, &description, json),
                RecipeCommands::Generate {
                    prompt,
                    tags,
                    save,
                    json,
                } => {
                    let generator = openai_generator(&config)?;
                    cmd_recipe_generate(&service, generator, &user, prompt, tags, save, json).await
                }
            }
        }
        Commands::Grocery { command } => {
            let user = service.get_or_create_user(&cli.user)?;
            match command {
                GroceryCommands::List { json } => cmd_grocery_list(&service, &user, json),
                GroceryCommands::Add {
                    name,
                    quantity,
                    unit,
                    json,
                } => cmd_grocery_add(&service, &user, &name, &quantity, unit.as_deref(), json),
                GroceryCommands::Import { recipe, json } => {
                    cmd_grocery_import(&service, &user, recipe, json)
                }
                GroceryCommands::Check { id, json } => {
                    cmd_grocery_check(&service, &user, id, true, json)
                }
                GroceryCommands::Uncheck { id, json } => {
                    cmd_grocery_check(&service, &user, id, false, json)
                }
                GroceryCommands::Remove { id, json } => cmd_grocery_remove(&service, &user, id, json),
                GroceryCommands::Clear { json } => cmd_grocery_clear(&service, &user, json),
            }
        }
    }
}
