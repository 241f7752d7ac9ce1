//! atlasstore CLI
//!
//! Operates on one persistent store with string keys and values.

use std::path::PathBuf;
use std::process;

use atlasstore::{BackendKind, Options, Store, StoreError};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// atlasstore CLI
#[derive(Parser, Debug)]
#[command(name = "atlasstore")]
#[command(about = "Inspect and maintain atlasstore persistent stores")]
#[command(version)]
struct Args {
    /// Directory holding one subdirectory per store
    #[arg(short, long, default_value = ".")]
    db_dir: PathBuf,

    /// Store name
    #[arg(short, long)]
    store: String,

    /// Skip fsync on every write
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { key: String },

    /// Set a key-value pair
    Put { key: String, value: String },

    /// Delete a key
    Del { key: String },

    /// Print every entry in key order
    List,

    /// Print the number of entries
    Count,

    /// Write `key=value` pairs as one atomic batch
    Import {
        #[arg(required = true)]
        pairs: Vec<String>,
    },

    /// Archive the store to <dest>/<store>.tar.gz
    Checkpoint { dest: PathBuf },

    /// Replace the store with an archive (file, or directory holding <store>.tar.gz)
    Restore { source: PathBuf },

    /// Print engine statistics
    Status,

    /// Remove the store and all of its files
    Destroy,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,atlasstore=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> atlasstore::Result<()> {
    let options = Options::builder()
        .db_dir(&args.db_dir)
        .sync(!args.no_sync)
        .build();

    match args.command {
        Commands::Restore { source } => {
            let store: Store<String, String> =
                Store::from_checkpoint(&args.store, options, &source)?;
            println!("restored {} entries", store.count()?);
            store.stop()
        }
        command => {
            let store: Store<String, String> =
                Store::open(&args.store, BackendKind::Persistent, options)?;
            let result = execute(&store, command);
            // Stopping a destroyed store is a no-op
            let stopped = store.stop();
            result.and(stopped)
        }
    }
}

fn execute(store: &Store<String, String>, command: Commands) -> atlasstore::Result<()> {
    match command {
        Commands::Get { key } => match store.lookup(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(not found)"),
        },
        Commands::Put { key, value } => store.put(&key, &value)?,
        Commands::Del { key } => store.delete(&key)?,
        Commands::List => {
            for (key, value) in store.to_list()? {
                println!("{}\t{}", key, value);
            }
        }
        Commands::Count => println!("{}", store.count()?),
        Commands::Import { pairs } => {
            let entries = parse_pairs(&pairs)?;
            let count = entries.len();
            store.from_list(entries)?;
            println!("imported {} entries", count);
        }
        Commands::Checkpoint { dest } => {
            let archive = store.checkpoint(&dest)?;
            println!("{}", archive.display());
        }
        Commands::Status => {
            if let Some(status) = store.status()? {
                print!("{}", status);
            }
        }
        Commands::Destroy => store.destroy()?,
        Commands::Restore { source } => {
            return Err(StoreError::Config(format!(
                "restore from {} needs the store closed",
                source.display()
            )))
        }
    }
    Ok(())
}

fn parse_pairs(pairs: &[String]) -> atlasstore::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| StoreError::Config(format!("expected key=value, got '{}'", pair)))
        })
        .collect()
}
