//! Administrative binary over the `geocache` library.
//!
//! A small `clap`-derived CLI that exercises the library end to end rather
//! than a production service. Three subcommands cover emitting a default
//! configuration, inspecting the resolved store roots, and driving ad hoc
//! retrievals through the full `FileStore` / `RetrievalService` /
//! `DataFileStore` stack.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use geocache::{DataFileStore, FileStore, GeocacheConfig, RetrievalService};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a geocache.toml configuration file. Defaults are used if
    /// omitted.
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a default configuration document to stdout.
    InitConfig,
    /// Print the resolved write root and read roots for a configuration.
    ShowRoots,
    /// Request one or more addresses through the store, polling until
    /// each resolves locally, fails permanently, or times out.
    Warm {
        /// Addresses (URLs or local file:// paths) to resolve.
        addresses: Vec<String>,
        /// Seconds to wait for each address before giving up.
        #[arg(long, default_value_t = 15)]
        timeout_secs: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    match args.command {
        Commands::InitConfig => init_config(),
        Commands::ShowRoots => show_roots(&args.config),
        Commands::Warm { addresses, timeout_secs } => {
            warm(&args.config, addresses, Duration::from_secs(timeout_secs))
        }
    }
}

fn load_config(path: &Option<PathBuf>) -> Result<GeocacheConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(GeocacheConfig::from_file(path)?),
        None => Ok(GeocacheConfig::default()),
    }
}

fn init_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = GeocacheConfig::default();
    print!("{}", config.to_toml()?);
    Ok(())
}

fn show_roots(path: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    match config.resolve_write_root() {
        Some(root) => println!("write root: {}", root.display()),
        None => println!("write root: <none configured>"),
    }
    for (index, root) in config.resolve_read_roots().iter().enumerate() {
        println!("read root[{index}]: {}", root.display());
    }
    Ok(())
}

/// Builds a fully wired `DataFileStore` (file roots, retrieval pool, and
/// index/absent-list tunables) from a parsed configuration.
fn build_store(config: &GeocacheConfig) -> Result<Arc<DataFileStore>, Box<dyn std::error::Error>> {
    let files = Arc::new(FileStore::new());
    if let Some(write_root) = config.resolve_write_root() {
        std::fs::create_dir_all(&write_root)?;
        files.set_write_location(write_root);
    }
    for (index, root) in config.resolve_read_roots().iter().enumerate() {
        files.add_location(index, root.clone(), false);
    }

    let retrieval = RetrievalService::start(
        config.retrieval.pool_size,
        config.retrieval.queue_size,
        config.retrieval.stale_request_limit(),
        config.retrieval.connect_timeout(),
        config.retrieval.read_timeout(),
    );

    Ok(Arc::new(DataFileStore::new(
        files,
        retrieval,
        config.index.index_capacity,
        config.index.absent_max_entries,
        config.index.absent_max_tries,
        config.index.absent_min_check_interval(),
        config.index.absent_try_again_interval(),
        config.retrieval.cacheable_types(),
    )))
}

fn warm(
    path: &Option<PathBuf>,
    addresses: Vec<String>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let store = build_store(&config)?;

    for address in addresses {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(url) = store.request_file(&address, true) {
                println!("{address} -> {url}");
                break;
            }
            if Instant::now() >= deadline {
                println!("{address} -> timed out");
                break;
            }
            std::thread::sleep(Duration::from_millis(200));
        }
    }
    Ok(())
}
