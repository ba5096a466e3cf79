use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shelf", about = "Shelf: minimal self-hosted file sharing", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "SHELF_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub storage: StorageArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Storage overrides shared by every command.
#[derive(Args, Debug, Default)]
pub struct StorageArgs {
    /// Directory holding stored files
    #[arg(long, global = true, env = "RESOURCES_DIR")]
    pub resources_dir: Option<PathBuf>,

    /// JSON file mapping ids to file names
    #[arg(long, global = true, env = "MAPPING_PATH")]
    pub mapping_path: Option<PathBuf>,

    /// Largest accepted file in bytes (0 = no limit)
    #[arg(long, global = true, env = "MAX_FILE_SIZE")]
    pub max_file_size: Option<u64>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Store a local file
    Add(AddArgs),
    /// List stored files
    List(ListArgs),
    /// Show a stored file, or copy it out
    Show(ShowArgs),
    /// Delete a stored file
    Rm(RmArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    #[arg(long, env = "HOST")]
    pub host: Option<String>,
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,
}

#[derive(Args)]
pub struct AddArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct ListArgs {}

#[derive(Args)]
pub struct ShowArgs {
    pub id: String,
    /// Write the file content here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct RmArgs {
    pub id: String,
}
