pub mod add;
pub mod category;
pub mod common;
pub mod completions;
pub mod config;
pub mod delete;
pub mod edit;
pub mod export;
pub mod list;
pub mod note_flags;
pub mod show;
pub mod sync;
