//! riplay-offline - command line driver for the riplay offline cache.
//!
//! Runs the cache generation lifecycle against the configured manifest and
//! loads individual resources through the active generation.

mod cli;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use riplay_offline_core::{CacheStorage, Config, Host, HttpNetwork, Request};

use cli::{Cli, Commands, FetchArgs};

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: u8) {
    // RUST_LOG wins over -v when set
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    match cli.config {
        Some(ref path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn build_host(config: &Config) -> Result<Host> {
    let cache_dir = config.cache_dir()?;
    let storage = CacheStorage::new(cache_dir.clone())
        .with_context(|| format!("Failed to open cache directory {}", cache_dir.display()))?;
    let network = HttpNetwork::new(config.request_timeout())?;
    Ok(Host::new(
        config.origin.clone(),
        Arc::new(storage),
        Arc::new(network),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let host = build_host(&config)?;
    info!(origin = %config.origin, cache = %config.cache_name, "riplay-offline starting");

    match cli.command {
        Commands::Install => install(&config, &host).await,
        Commands::Fetch(ref args) => fetch(&config, &host, args).await,
        Commands::Status => status(&config, &host).await,
        Commands::Purge => purge(&host).await,
    }
}

async fn install(config: &Config, host: &Host) -> Result<()> {
    let registration = host
        .register(&config.cache_name, config.manifest.clone())
        .await
        .with_context(|| format!("Failed to install {}", config.cache_name))?;

    println!(
        "{} {} ({} entries)",
        registration.version, registration.state, registration.entries
    );
    for name in &registration.deleted {
        println!("  deleted {}", name);
    }
    Ok(())
}

async fn fetch(config: &Config, host: &Host, args: &FetchArgs) -> Result<()> {
    if !host
        .resume(&config.cache_name, config.manifest.clone())
        .await?
    {
        warn!(cache = %config.cache_name, "No installed cache generation, loading from network");
    }

    let request = Request::parse(&args.method, &args.url)?;
    let response = host
        .fetch(request)
        .await
        .with_context(|| format!("Failed to load {}", args.url))?;

    eprintln!("{} {}", response.status, args.url);
    for (name, value) in &response.headers {
        eprintln!("{}: {}", name, value);
    }

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &response.body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {} bytes to {}", response.body.len(), path.display());
        }
        None => {
            io::stdout().write_all(&response.body)?;
        }
    }
    Ok(())
}

async fn status(config: &Config, host: &Host) -> Result<()> {
    let storage = host.storage();
    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No cache generations in {}", storage.root().display());
        return Ok(());
    }

    for name in names {
        let entries = storage.entries(&name).await?;
        let marker = if name == config.cache_name { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, entries.len());
        for entry in entries {
            println!(
                "    {} {} [{}]",
                entry.response.status,
                entry.url,
                entry.age_display()
            );
        }
    }
    Ok(())
}

async fn purge(host: &Host) -> Result<()> {
    let storage = host.storage();
    for name in storage.keys().await? {
        storage.delete(&name).await?;
        println!("deleted {}", name);
    }
    Ok(())
}
