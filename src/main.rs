//! # Recipe Explorer CLI (`recipes`)
//!
//! The `recipes` binary drives the recipe catalog: database setup, the
//! HTTP API, schema validation of import files, and quick lookups.
//!
//! ## Usage
//!
//! ```bash
//! recipes --config ./config/recipes.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recipes init` | Create the SQLite database and run schema migrations |
//! | `recipes serve` | Start the JSON HTTP API |
//! | `recipes validate <files..>` | Check JSON files against the recipe schema |
//! | `recipes import <file>` | Replace the catalog with a validated JSON file |
//! | `recipes export` | Write the catalog as JSON |
//! | `recipes search "<query>"` | Search local recipes and TheMealDB |
//! | `recipes get <id>` | Show one recipe, local or external |
//! | `recipes sources` | Store, cache and external API status |
//!
//! ## Examples
//!
//! ```bash
//! recipes init --config ./config/recipes.toml
//! recipes validate data/sample-recipes.json
//! recipes import data/sample-recipes.json --config ./config/recipes.toml
//! recipes search "chicken" --config ./config/recipes.toml
//! recipes get external-52772 --config ./config/recipes.toml
//! recipes serve --config ./config/recipes.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use recipe_explorer::config::{self, Config};
use recipe_explorer::export;
use recipe_explorer::mealdb::EXTERNAL_ID_PREFIX;
use recipe_explorer::migrate;
use recipe_explorer::models::ExternalRecipe;
use recipe_explorer::models::Recipe;
use recipe_explorer::server::{self, AppState};
use recipe_explorer::sources;
use recipe_explorer::validation::{validate_file, FileReport};

/// Recipe Explorer CLI: a recipe catalog that merges a local store with
/// TheMealDB.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. `validate` works without one.
#[derive(Parser)]
#[command(
    name = "recipes",
    about = "Recipe Explorer: a local recipe catalog merged with TheMealDB",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/recipes.toml`.
    #[arg(long, global = true, default_value = "./config/recipes.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the JSON HTTP API.
    ///
    /// Binds to `[server].bind`. When `[server].seed_file` is set and the
    /// store is empty, the file is imported first.
    Serve,

    /// Validate recipe JSON files against the schema.
    ///
    /// Exits with status 1 if any file is unreadable, is not a JSON array,
    /// or contains a recipe that fails validation.
    Validate {
        /// JSON files containing an array of recipes.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Replace the catalog with the recipes in a JSON file.
    ///
    /// Nothing is imported unless every recipe passes validation.
    Import {
        file: PathBuf,
    },

    /// Export the catalog as a JSON array.
    Export {
        /// Output file path. Writes to stdout if not specified.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Search local recipes by title and TheMealDB by name.
    Search {
        query: String,
    },

    /// Show a recipe by id: a local id, `external-<id>`, or a TheMealDB id.
    Get {
        id: String,
    },

    /// Show store, cache and external API status.
    Sources,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Validate { files } = &cli.command {
        return Ok(run_validate(files));
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Validate { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
        Commands::Import { file } => {
            return run_import(&cfg, &file).await;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Search { query } => {
            run_search(&cfg, &query).await?;
        }
        Commands::Get { id } => {
            return run_get(&cfg, &id).await;
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_report_errors(report: &FileReport) {
    for msg in report.messages() {
        println!("{}", msg);
    }
}

fn run_validate(files: &[PathBuf]) -> ExitCode {
    let mut failed = false;

    for path in files {
        match validate_file(path) {
            Ok(report) => {
                print_report_errors(&report);
                failed |= !report.is_ok();
            }
            Err(e) => {
                println!("Error: {}: {:#}", path.display(), e);
                failed = true;
            }
        }
    }

    if failed {
        eprintln!("\nValidation failed.");
        return ExitCode::FAILURE;
    }

    println!("All recipes passed schema validation.");
    ExitCode::SUCCESS
}

async fn run_import(cfg: &Config, file: &Path) -> anyhow::Result<ExitCode> {
    let report = validate_file(file)?;
    if !report.is_ok() {
        print_report_errors(&report);
        eprintln!("\nImport aborted: {} schema errors.", report.errors.len());
        return Ok(ExitCode::FAILURE);
    }

    let state = AppState::from_config(cfg).await?;
    let count = state.store.import_replace(report.valid).await?;
    println!("Successfully imported {} recipes", count);
    Ok(ExitCode::SUCCESS)
}

fn print_internal(recipe: &Recipe) {
    println!("[internal] {}  {}", recipe.id, recipe.title);
}

fn print_external(recipe: &ExternalRecipe) {
    let cuisine = recipe.cuisine.as_deref().unwrap_or("-");
    println!("[external] {}  {}  ({})", recipe.id, recipe.title, cuisine);
}

async fn run_search(cfg: &Config, query: &str) -> anyhow::Result<()> {
    let state = AppState::from_config(cfg).await?;

    let local = state.store.search(query).await?;
    let external = state.external.search(query).await;

    if local.is_empty() && external.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for recipe in &local {
        print_internal(recipe);
    }
    for recipe in &external {
        print_external(recipe);
    }

    Ok(())
}

async fn run_get(cfg: &Config, id: &str) -> anyhow::Result<ExitCode> {
    let state = AppState::from_config(cfg).await?;

    let value = match state.store.get(id).await? {
        Some(recipe) => recipe.to_response(),
        None => {
            let external_id = id.strip_prefix(EXTERNAL_ID_PREFIX).unwrap_or(id);
            match state.external.lookup(external_id).await {
                Some(recipe) => serde_json::to_value(&recipe)?,
                None => {
                    eprintln!("Recipe not found: {}", id);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(ExitCode::SUCCESS)
}
