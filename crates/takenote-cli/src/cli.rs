use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "takenote")]
#[command(about = "Notes and categories from the command line, synced through a shared snapshot")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name holding the remote configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Quick capture: takenote "my thought here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// File the note under this category (name or id)
        #[arg(short, long, value_name = "CATEGORY")]
        category: Option<String>,
        /// Note content
        content: Vec<String>,
    },
    /// List notes
    List {
        /// Only notes in this category (name or id)
        #[arg(long, value_name = "CATEGORY", conflicts_with_all = ["favorites", "trash", "scratchpad"])]
        category: Option<String>,
        /// Only favorite notes
        #[arg(long, conflicts_with_all = ["trash", "scratchpad"])]
        favorites: bool,
        /// Only trashed notes
        #[arg(long, conflicts_with = "scratchpad")]
        trash: bool,
        /// Only the scratchpad
        #[arg(long)]
        scratchpad: bool,
        /// Sort order
        #[arg(long, value_enum, default_value_t = SortOrder::LastUpdated)]
        sort: SortOrder,
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a note
    Show {
        /// Note ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note
    Edit {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Toggle the favorite flag
    Favorite {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Move a note to the trash
    Trash {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Restore a note from the trash
    Restore {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Delete a note permanently
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Permanently delete every trashed note
    EmptyTrash,
    /// File a note under a category, or unfile it when no category is given
    Move {
        /// Note ID or unique ID prefix
        id: String,
        /// Target category (name or id)
        #[arg(short, long, value_name = "CATEGORY")]
        category: Option<String>,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Sync with the configured remote snapshot
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Export notes
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Include trashed notes
        #[arg(long)]
        include_trash: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SortOrder {
    LastUpdated,
    Title,
    Created,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RemoteKind {
    File,
    Gist,
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Create a category
    Add {
        /// Display name
        name: Vec<String>,
    },
    /// Rename a category; its id stays the same
    Rename {
        /// Category name or id
        category: String,
        /// New display name
        name: Vec<String>,
    },
    /// Delete a category; its notes become unfiled
    Delete {
        /// Category name or id
        category: String,
    },
    /// List categories in sidebar order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a category from one sidebar position to another
    Reorder {
        /// Current position (0-based)
        from: usize,
        /// New position (0-based)
        to: usize,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show when the last sync happened and what is pending
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Where the shared snapshot lives
        #[arg(long, value_enum)]
        remote: Option<RemoteKind>,
        /// Snapshot file path (file remote)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,
        /// Gist id (gist remote)
        #[arg(long, value_name = "ID")]
        gist_id: Option<String>,
        /// GitHub API base URL (gist remote)
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Snapshot file name inside the gist
        #[arg(long, value_name = "NAME")]
        file_name: Option<String>,
        /// Seconds to wait on each remote call
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,
        /// Days deletion markers are kept in the snapshot
        #[arg(long, value_name = "DAYS")]
        tombstone_retention_days: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Profile name to show
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
