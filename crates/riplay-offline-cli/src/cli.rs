//! CLI argument definitions using clap derive

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// riplay-offline - offline cache for the riplay site
///
/// Installs the site's asset manifest into a versioned cache generation
/// and serves requests network-first (same origin) or cache-first (CDN).
#[derive(Parser, Debug)]
#[command(name = "riplay-offline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "RIPLAY_OFFLINE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the configured cache generation and activate it
    Install,

    /// Load one resource through the cache
    Fetch(FetchArgs),

    /// List cache generations and their entries
    Status,

    /// Delete every cache generation
    Purge,
}

#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Absolute URL to load
    pub url: String,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Write the response body here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
