use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DATABASE_DSN_ENV: &str = "SNIP_DATABASE_DSN";
pub const FILE_STORAGE_ENV: &str = "SNIP_FILE_STORAGE";
pub const URL_LENGTH_ENV: &str = "SNIP_URL_LENGTH";
pub const TIMEOUT_SECS_ENV: &str = "SNIP_TIMEOUT_SECS";
pub const MAX_ATTEMPTS_ENV: &str = "SNIP_MAX_ATTEMPTS";
pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";

pub const DEFAULT_URL_LENGTH: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Shorten and resolve URLs")]
pub struct CLI {
    /// Relational database to store mappings in. Takes precedence over
    /// `--file-storage`.
    #[arg(long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// Snapshot file to store mappings in.
    #[arg(long, env = FILE_STORAGE_ENV)]
    pub file_storage: Option<PathBuf>,

    #[arg(long, env = URL_LENGTH_ENV, default_value_t = DEFAULT_URL_LENGTH)]
    pub url_length: usize,

    #[arg(long, env = TIMEOUT_SECS_ENV, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    #[arg(
        long,
        env = MAX_ATTEMPTS_ENV,
        default_value_t = DEFAULT_MAX_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    pub max_attempts: u32,

    /// Prefix printed codes with this URL, e.g. `http://localhost:8080`.
    #[arg(long, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prints the short code for each URL, creating it if needed.
    Shorten {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Prints the URL a short code points at.
    Resolve { code: String },
    /// Prints every URL an owner has shortened, oldest first.
    List {
        #[arg(long)]
        owner: String,
    },
    /// Checks that the storage backend is reachable.
    Ping,
}
