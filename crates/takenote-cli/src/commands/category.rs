use std::path::Path;

use serde::Serialize;
use takenote_core::{Mutation, NoteFilter, NotesSortKey};

use crate::cli::CategoryCommands;
use crate::commands::common::{load_store, normalize_category_name, resolve_category, update_store};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct CategoryListItem {
    pub id: String,
    pub name: String,
    pub position: u32,
    pub notes: usize,
}

pub fn run_category(command: CategoryCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        CategoryCommands::Add { name } => run_category_add(&name, db_path),
        CategoryCommands::Rename { category, name } => {
            run_category_rename(&category, &name, db_path)
        }
        CategoryCommands::Delete { category } => run_category_delete(&category, db_path),
        CategoryCommands::List { json } => run_category_list(json, db_path),
        CategoryCommands::Reorder { from, to } => run_category_reorder(from, to, db_path),
    }
}

fn run_category_add(name_parts: &[String], db_path: &Path) -> Result<(), CliError> {
    let name = normalize_category_name(name_parts)?;
    let applied = update_store(db_path, |store| {
        Ok(store.apply(Mutation::AddCategory { name })?)
    })?;
    if let Some(id) = applied.category_id() {
        println!("{id}");
    }
    Ok(())
}

fn run_category_rename(query: &str, name_parts: &[String], db_path: &Path) -> Result<(), CliError> {
    let name = normalize_category_name(name_parts)?;
    let id = update_store(db_path, |store| {
        let id = resolve_category(store, query)?;
        store.apply(Mutation::RenameCategory {
            id: id.clone(),
            name,
        })?;
        Ok(id)
    })?;
    println!("{id}");
    Ok(())
}

fn run_category_delete(query: &str, db_path: &Path) -> Result<(), CliError> {
    let (id, unfiled) = update_store(db_path, |store| {
        let id = resolve_category(store, query)?;
        let applied = store.apply(Mutation::DeleteCategory { id: id.clone() })?;
        Ok((id, applied.touched.len().saturating_sub(1)))
    })?;
    if unfiled == 0 {
        println!("{id}");
    } else {
        println!("{id} ({unfiled} note(s) unfiled)");
    }
    Ok(())
}

fn run_category_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = load_store(db_path)?;
    let items = store
        .categories()
        .into_iter()
        .map(|category| CategoryListItem {
            id: category.id.as_str().to_string(),
            name: category.name.clone(),
            position: category.position,
            notes: store
                .notes_view(
                    &NoteFilter::Category(category.id.clone()),
                    NotesSortKey::LastUpdated,
                )
                .len(),
        })
        .collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No categories yet.");
        return Ok(());
    }

    for (index, item) in items.iter().enumerate() {
        println!("{index:>3}  {:<24}  {:<24}  {} note(s)", item.name, item.id, item.notes);
    }
    Ok(())
}

fn run_category_reorder(from: usize, to: usize, db_path: &Path) -> Result<(), CliError> {
    update_store(db_path, |store| {
        Ok(store.apply(Mutation::ReorderCategories { from, to })?)
    })?;
    run_category_list(false, db_path)
}
