//! Schema AST CLI
//!
//! Parses a JSON Schema file and prints the normalized AST, or manages the
//! on-disk schema cache.
//!
//! Usage:
//!   schema-ast parse schemas/order.json --max-depth 3
//!   schema-ast cache stats

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use schema_ast::config::ResolverConfig;
use schema_ast::{parse, DefaultFetcher, EngineConfig, FileStore, ParseOptions, SchemaCache};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-ast")]
#[command(about = "Normalize JSON Schema documents into an AST")]
struct Cli {
    /// Explicit configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a schema file and print the result as JSON
    Parse {
        /// Schema file
        file: PathBuf,

        /// Base URL for relative external refs (defaults to the file's location)
        #[arg(short, long)]
        base_url: Option<String>,

        /// Maximum nesting of external documents
        #[arg(long)]
        max_depth: Option<usize>,

        /// Maximum number of external documents fetched
        #[arg(long)]
        max_files: Option<usize>,

        /// Fetch external documents without the cache
        #[arg(long)]
        no_cache: bool,

        /// Single-line JSON output
        #[arg(long)]
        compact: bool,
    },

    /// Manage the schema cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count, size and compression ratio
    Stats,
    /// Remove stale entries
    Clean,
    /// Remove every entry
    Clear,
    /// Remove the oldest entry
    Evict,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = EngineConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Parse {
            file,
            base_url,
            max_depth,
            max_files,
            no_cache,
            compact,
        } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let base_url = match base_url {
                Some(url) => url,
                None => default_base(&file)?,
            };
            let limits = ResolverConfig {
                max_depth: max_depth.unwrap_or(config.resolver.max_depth),
                max_files: max_files.unwrap_or(config.resolver.max_files),
                ..config.resolver
            };

            let fetcher = DefaultFetcher::from_config(&config.fetch)?;
            let mut cache = if no_cache || !config.cache.enabled {
                None
            } else {
                Some(open_cache(&config)?)
            };

            let mut options = ParseOptions::new()
                .with_fetcher(&fetcher)
                .with_limits(limits)
                .with_progress(|current, total, url| {
                    info!(current, total, url, "loading external schema");
                });
            if let Some(cache) = cache.as_mut() {
                options = options.with_cache(cache);
            }

            let output = parse(&raw, Some(&base_url), options);

            if let Some(cache) = cache.as_mut() {
                let evicted = cache.enforce_budget(config.cache.size_budget);
                if evicted > 0 {
                    info!(evicted, "cache trimmed to budget");
                }
            }

            let rendered = if compact {
                serde_json::to_string(&output)?
            } else {
                serde_json::to_string_pretty(&output)?
            };
            println!("{}", rendered);

            for warning in &output.warnings {
                eprintln!("warning: {}", warning);
            }
            for error in &output.errors {
                eprintln!("error: {}", error);
            }
            Ok(if output.is_ok() { 0 } else { 1 })
        }

        Commands::Cache { action } => {
            let mut cache = open_cache(&config)?;
            match action {
                CacheAction::Stats => {
                    println!("{}", serde_json::to_string_pretty(&cache.stats())?);
                }
                CacheAction::Clean => {
                    let removed = cache.clean_stale();
                    println!("Removed {} stale entries", removed);
                }
                CacheAction::Clear => {
                    cache.clear();
                    println!("Cache cleared");
                }
                CacheAction::Evict => {
                    if cache.evict_oldest() {
                        println!("Evicted oldest entry");
                    } else {
                        println!("Cache is empty");
                    }
                }
            }
            Ok(0)
        }
    }
}

fn open_cache(config: &EngineConfig) -> anyhow::Result<SchemaCache> {
    let Some(dir) = config.cache.directory() else {
        bail!("No cache directory configured and no platform cache directory available");
    };
    let store = FileStore::open(&dir)
        .with_context(|| format!("opening cache at {}", dir.display()))?
        .with_quota(config.cache.size_budget);
    Ok(SchemaCache::from_config(store, &config.cache))
}

fn default_base(file: &Path) -> anyhow::Result<String> {
    let absolute = fs::canonicalize(file).with_context(|| format!("resolving {}", file.display()))?;
    Ok(absolute.to_string_lossy().into_owned())
}
