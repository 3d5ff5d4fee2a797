//! TakeNote CLI - notes and categories from the terminal
//!
//! Edits land in a local `SQLite` database; `takenote sync` reconciles them
//! with the snapshot shared by every other replica.

mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::category::run_category;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::{run_delete, run_empty_trash};
use crate::commands::edit::run_edit;
use crate::commands::export::run_export;
use crate::commands::list::{run_list, ListSelection};
use crate::commands::note_flags::{run_favorite, run_move, run_restore, run_trash};
use crate::commands::show::run_show;
use crate::commands::sync::{run_sync, run_sync_conflicts, run_sync_status};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "takenote=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let profile = cli.profile.as_deref();

    match cli.command {
        Some(Commands::Add { category, content }) => {
            run_add(&content, category.as_deref(), &db_path)?;
        }
        Some(Commands::List {
            category,
            favorites,
            trash,
            scratchpad,
            sort,
            limit,
            json,
        }) => {
            let selection = ListSelection {
                category,
                favorites,
                trash,
                scratchpad,
            };
            run_list(&selection, sort, limit, json, &db_path)?;
        }
        Some(Commands::Show { id, json }) => run_show(&id, json, &db_path)?,
        Some(Commands::Edit { id }) => run_edit(&id, &db_path)?,
        Some(Commands::Favorite { id }) => run_favorite(&id, &db_path)?,
        Some(Commands::Trash { id }) => run_trash(&id, &db_path)?,
        Some(Commands::Restore { id }) => run_restore(&id, &db_path)?,
        Some(Commands::Delete { id }) => run_delete(&id, &db_path)?,
        Some(Commands::EmptyTrash) => run_empty_trash(&db_path)?,
        Some(Commands::Move { id, category }) => {
            run_move(&id, category.as_deref(), &db_path)?;
        }
        Some(Commands::Category { command }) => run_category(command, &db_path)?,
        Some(Commands::Sync { command }) => match command {
            None => run_sync(profile, &db_path).await?,
            Some(SyncCommands::Status { json }) => run_sync_status(profile, json, &db_path)?,
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &db_path)?;
            }
        },
        Some(Commands::Export {
            format,
            output,
            include_trash,
        }) => run_export(format, output.as_deref(), include_trash, &db_path)?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        Some(Commands::Config { command }) => run_config(command, profile)?,
        None => {
            // Quick capture mode: takenote "my thought"
            if cli.note.is_empty() {
                println!("Usage: takenote \"your note\" or takenote --help");
            } else {
                run_add(&cli.note, None, &db_path)?;
            }
        }
    }

    Ok(())
}
