//! Lorascope CLI - Adapter block-vector tooling
//!
//! Inspects adapter files, resolves layouts, and blends or allocates stored
//! block vectors.

use clap::{Parser, Subcommand};
use lorascope_core::FamilySelection;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod config;
mod loader;

use config::CliConfig;
use loader::AdapterLoader;

/// Lorascope - Per-block strength analysis for low-rank adapters
#[derive(Parser)]
#[command(name = "lorascope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a layout identifier
    Layout {
        /// Layout identifier, e.g. flux_double_57
        id: String,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// List tensor keys of an adapter file
    Keys {
        /// Adapter file (safetensors)
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Extract the block vector of an adapter file
    Inspect {
        /// Adapter file (safetensors)
        file: PathBuf,

        /// Restrict detection to one architecture family
        #[arg(short, long, value_enum)]
        family: Option<FamilyArg>,

        /// Expected BLAKE3 hash of the file (hex)
        #[arg(long)]
        expect_hash: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Combine stored block vectors
    Combine {
        /// Request file (JSON) with adapters and per-adapter settings
        request: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Allocate strengths by role and overlap
    Allocate {
        /// Request file (JSON) with adapters, roles and block weights
        request: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum FamilyArg {
    /// Try every family
    Auto,
    /// Transformer-style keys
    Transformer,
    /// Fixed 57-slot keys
    Unet57,
}

impl From<FamilyArg> for FamilySelection {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Auto => Self::Auto,
            FamilyArg::Transformer => Self::Transformer,
            FamilyArg::Unet57 => Self::Unet57,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = CliConfig::load(cli.config.as_deref())?;
    let loader = AdapterLoader::new(config.loader.clone());

    match cli.command {
        Commands::Layout { id, json } => {
            commands::layout::run(&id, json)?;
        }

        Commands::Keys { file, json } => {
            commands::keys::run(&loader, &file, json)?;
        }

        Commands::Inspect {
            file,
            family,
            expect_hash,
            json,
        } => {
            let mut scan = config.scan.clone();
            if let Some(family) = family {
                scan = scan.with_family(family.into());
            }
            commands::inspect::run(&loader, &file, &scan, expect_hash.as_deref(), json)?;
        }

        Commands::Combine { request, json } => {
            commands::combine::run(&request, &config.composer, json)?;
        }

        Commands::Allocate { request, json } => {
            commands::allocate::run(&request, &config.allocator, json)?;
        }
    }

    Ok(())
}
