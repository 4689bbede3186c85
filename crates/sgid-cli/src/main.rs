//! sgid - command-line administration for the record identifier store.
//!
//! Results go to stdout (plain text or `--json`); logs go to stderr.

mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sgid_core::{
    CategoryPair, RecordIdentifierAllocator, SequenceStore, SgidError, SqliteSequenceStore,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "sgid")]
#[command(about = "Allocate and inspect category-scoped record identifiers")]
struct Args {
    /// Identifier database (defaults to the platform config directory)
    #[arg(long, global = true, env = "SGID_DB")]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate the next identifier in a category for a record
    Allocate {
        record_key: String,
        /// Dotted category code, e.g. 3.07
        category: String,
    },
    /// Show the identifier allocated to a record
    Lookup { record_key: String },
    /// Render an identifier from its parts without touching the database
    Format {
        first: u32,
        second: u32,
        sequence: u64,
    },
    /// Record a previously issued identifier for a record
    Adopt {
        record_key: String,
        identifier: String,
    },
    /// List every identifier allocated in a category
    List { category: String },
    /// Check all categories for gaps and counter drift
    Audit,
}

fn open_allocator(db: Option<PathBuf>) -> Result<RecordIdentifierAllocator<SqliteSequenceStore>> {
    let store = match db {
        Some(path) => {
            debug!("Using identifier database {}", path.display());
            SqliteSequenceStore::open_at(&path)
        }
        None => SqliteSequenceStore::open(),
    }
    .context("Failed to open identifier database")?;
    Ok(RecordIdentifierAllocator::new(Arc::new(store)))
}

fn run(args: Args) -> Result<()> {
    let json = args.json;

    match args.command {
        Command::Format {
            first,
            second,
            sequence,
        } => {
            let id = sgid_core::format_identifier(first, second, sequence)?;
            output::identifier(json, &id, None)
        }
        Command::Allocate {
            record_key,
            category,
        } => {
            let pair: CategoryPair = category.parse()?;
            let alloc = open_allocator(args.db)?;
            let row = alloc.allocate_pair(&record_key, pair)?;
            output::row(json, &row)
        }
        Command::Lookup { record_key } => {
            let alloc = open_allocator(args.db)?;
            let id = alloc.lookup(&record_key)?;
            output::identifier(json, &id, Some(&record_key))
        }
        Command::Adopt {
            record_key,
            identifier,
        } => {
            let alloc = open_allocator(args.db)?;
            let row = alloc.adopt(&record_key, &identifier)?;
            output::row(json, &row)
        }
        Command::List { category } => {
            let pair: CategoryPair = category.parse()?;
            let alloc = open_allocator(args.db)?;
            let rows = alloc.store().sequences_for_pair(pair)?;
            output::rows(json, &rows)
        }
        Command::Audit => {
            let alloc = open_allocator(args.db)?;
            let report = alloc.store().audit()?;
            output::audit(json, &report)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            let code = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<SgidError>())
                .map(SgidError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
