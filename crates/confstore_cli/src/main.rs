//! confstore CLI
//!
//! Command-line tools for inspecting and editing confstore settings.
//!
//! # Commands
//!
//! - `read` - Print the value of a key as JSON
//! - `write` - Write a JSON value to a key
//! - `apply` - Write a JSON object of keys atomically
//! - `reset` - Reset keys to their defaults
//! - `writable` - Report whether keys may be written
//! - `dump` - List every value in a settings file
//! - `watch` - Print changes as they happen
//!
//! The backend comes from `--backend`/`--path`, falling back to the
//! `CONFSTORE_BACKEND` and `CONFSTORE_PATH` environment variables.

mod commands;
mod json;

use clap::{Parser, Subcommand};
use confstore_storage::{Config, DefaultBackend, FORMAT_VERSION};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// confstore command-line settings tools.
#[derive(Parser)]
#[command(name = "confstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the settings file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Backend to use (memory, file, null)
    #[arg(global = true, short, long)]
    backend: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value of a key as JSON
    Read {
        /// Key to read
        key: String,

        /// Expected value type (b, x, s, ay, as, a{sx}, ...)
        #[arg(short = 't', long = "type", default_value = "s")]
        ty: String,

        /// Read the default value instead
        #[arg(long, conflicts_with = "user")]
        default: bool,

        /// Read only a value the user set
        #[arg(long)]
        user: bool,
    },

    /// Write a JSON value to a key
    Write {
        /// Key to write
        key: String,

        /// Value as JSON; bare words are taken as text
        value: String,

        /// Value type; inferred from the JSON when omitted
        #[arg(short = 't', long = "type")]
        ty: Option<String>,
    },

    /// Write a JSON object of keys to values as one batch
    Apply {
        /// JSON file, or - for standard input
        source: PathBuf,
    },

    /// Reset keys to their defaults
    Reset {
        /// Keys to reset
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Report whether keys may be written
    Writable {
        /// Keys to check
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List every value in a settings file
    Dump {
        /// Only show keys under this path
        #[arg(default_value = "/")]
        prefix: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print changes under a key or path as they happen
    Watch {
        /// Key or path to watch
        #[arg(default_value = "/")]
        name: String,

        /// Polling interval in milliseconds
        #[arg(short, long, default_value = "500")]
        interval: u64,

        /// Exit after this many changes
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env();
    if let Some(backend) = cli.backend {
        config = config.backend(backend);
    }
    if let Some(path) = cli.path {
        config = config.path(path);
    }
    let default = DefaultBackend::new(config);

    match cli.command {
        Commands::Read {
            key,
            ty,
            default: default_value,
            user,
        } => {
            commands::read::run(&default.get()?, &key, &ty, default_value, user)?;
        }
        Commands::Write { key, value, ty } => {
            commands::write::run(&default.get()?, &key, &value, ty.as_deref())?;
        }
        Commands::Apply { source } => {
            commands::apply::run(&default.get()?, &source)?;
        }
        Commands::Reset { keys } => {
            commands::reset::run(&default.get()?, &keys)?;
        }
        Commands::Writable { keys } => {
            commands::writable::run(&default.get()?, &keys)?;
        }
        Commands::Dump { prefix, format } => {
            let path = default.config().path.clone().ok_or("Settings file path required for dump")?;
            commands::dump::run(&path, &prefix, &format)?;
        }
        Commands::Watch {
            name,
            interval,
            limit,
        } => {
            let path = default.config().path.clone().ok_or("Settings file path required for watch")?;
            commands::watch::run(&path, &name, Duration::from_millis(interval), limit)?;
        }
        Commands::Version => {
            println!("confstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Settings file format v{FORMAT_VERSION}");
        }
    }

    default.reset();
    Ok(())
}
