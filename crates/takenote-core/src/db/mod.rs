//! Database layer for TakeNote

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{LocalRepository, SqliteLocalRepository, SyncMeta};
