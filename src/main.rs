//! File Cache command-line front end
//!
//! Opens the cache rooted at `--root` (or `FILE_CACHE_ROOT`), runs a single
//! command against it and prints the result as JSON. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_cache::models::{
    CountResponse, ErrorResponse, ExistsResponse, FlushResponse, GetResponse, KeysResponse,
    PolicyResponse, RemoveResponse, SetResponse, SizeResponse, TrimResponse,
};
use file_cache::{CacheConfig, CacheItemPolicy, FileCache};

#[derive(Parser, Debug)]
#[command(name = "file_cache")]
#[command(about = "Inspect and manipulate a disk-resident file cache", long_about = None)]
struct Cli {
    /// Cache root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Ceiling in bytes that triggers an automatic trim
    #[arg(long, global = true)]
    max_size: Option<u64>,

    /// Lock wait per file, e.g. "250ms"; 0 waits indefinitely
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    access_timeout: Option<Duration>,

    /// Region to operate on; omitted means FILE_CACHE_DEFAULT_REGION (or the
    /// default region) for entry commands and the whole cache for scope
    /// commands
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the live value of a key; exits 1 when absent
    Get { key: String },
    /// Store a value
    Set {
        key: String,
        value: String,
        /// Absolute expiration relative to now, e.g. "10m"
        #[arg(long, value_parser = humantime::parse_duration, conflicts_with = "sliding")]
        expires_in: Option<Duration>,
        /// Sliding expiration window, e.g. "30s"
        #[arg(long, value_parser = humantime::parse_duration)]
        sliding: Option<Duration>,
    },
    /// Delete a key, printing its previous value
    Remove { key: String },
    /// Check whether a key has a file in the cache
    Exists { key: String },
    /// List keys
    Keys,
    /// Count entry files
    Count,
    /// Show the stored expiration policy of a key
    Policy { key: String },
    /// Delete expired entries
    Flush {
        /// Delete entries whose deadline is before this RFC 3339 instant
        #[arg(long)]
        before: Option<DateTime<Utc>>,
    },
    /// Evict soonest-expiring entries until at most `target` bytes remain
    Trim { target: u64 },
    /// Report the running size total, or a region's bytes on disk
    Size {
        /// Walk the cache root instead of trusting the running total
        /// (which is only seeded when FILE_CACHE_EAGER_SIZE is set)
        #[arg(long)]
        recompute: bool,
    },
    /// Show hit/miss and size counters for this invocation
    Stats,
}

fn main() -> ExitCode {
    // Defaults to "file_cache=info", can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("command failed: {:#}", e);
            // Printing can only fail on a closed stdout; nothing left to report to
            let _ = print_json(&ErrorResponse::new(format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// Builds the cache configuration from the environment, then the flags.
fn build_config(cli: &Cli) -> CacheConfig {
    let mut config = CacheConfig::from_env();

    if let Some(root) = &cli.root {
        config.cache_root = root.clone();
    }
    if cli.max_size.is_some() {
        config.max_cache_size = cli.max_size;
    }
    if let Some(timeout) = cli.access_timeout {
        config.access_timeout = timeout;
    }
    config
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = build_config(&cli);
    debug!(?config, "configuration loaded");

    // Entry commands fall back to the configured default region; scope
    // commands treat a missing region as the whole cache
    let entry_region = cli.region.clone().or_else(|| config.default_region.clone());
    let cache = FileCache::open(config).context("failed to open cache")?;
    let region = cli.region.as_deref();

    match cli.command {
        Command::Get { key } => {
            let region = entry_region.as_deref();
            let payload = cache.read(&key, region)?.and_then(|entry| entry.payload);
            let found = payload.is_some();
            print_json(&GetResponse::new(key, region, payload))?;
            if !found {
                return Ok(ExitCode::from(1));
            }
        }
        Command::Set {
            key,
            value,
            expires_in,
            sliding,
        } => {
            let policy = match (expires_in, sliding) {
                (Some(ttl), _) => CacheItemPolicy::expires_in(ttl),
                (None, Some(window)) => CacheItemPolicy::sliding(window),
                (None, None) => CacheItemPolicy::never(),
            };
            let region = entry_region.as_deref();
            let previous = cache.write(&key, region, value.into_bytes(), &policy)?;
            print_json(&SetResponse::new(key, region, previous))?;
        }
        Command::Remove { key } => {
            let previous = cache.remove(&key, entry_region.as_deref())?;
            print_json(&RemoveResponse::new(key, previous))?;
        }
        Command::Exists { key } => {
            let exists = cache.exists(&key, entry_region.as_deref())?;
            print_json(&ExistsResponse { key, exists })?;
        }
        Command::Keys => {
            let keys = cache.keys(region)?;
            print_json(&KeysResponse::new(region, keys))?;
        }
        Command::Count => {
            let count = cache.count(region)?;
            print_json(&CountResponse {
                region: cli.region.clone(),
                count,
            })?;
        }
        Command::Policy { key } => {
            let policy = cache.policy_of(&key, entry_region.as_deref())?;
            print_json(&PolicyResponse::new(key, policy))?;
        }
        Command::Flush { before } => {
            let before = before.unwrap_or_else(Utc::now);
            let removed = cache.flush_before(before, region)?;
            print_json(&FlushResponse::new(region, before, removed))?;
        }
        Command::Trim { target } => {
            let remaining = cache.trim_to_size(target, region)?;
            print_json(&TrimResponse {
                region: cli.region.clone(),
                target,
                remaining,
            })?;
        }
        Command::Size { recompute } => {
            let size = match (recompute, region) {
                (false, None) => cache.current_size(),
                (true, None) => cache.recompute_size()?,
                (_, Some(_)) => cache.cache_size(region)?,
            };
            print_json(&SizeResponse {
                region: cli.region.clone(),
                size,
                max_size: cache.max_cache_size(),
            })?;
        }
        Command::Stats => {
            print_json(&cache.stats())?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{}", json);
    Ok(())
}
