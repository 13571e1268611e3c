//! sift CLI binary entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sift::{cli, output};

/// Static semantic analysis for Python: resolve names, find usages,
/// outline modules.
#[derive(Parser)]
#[command(name = "sift")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project root directory (default: the analyzed file's folder)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Observation file with recorded runtime types to seed inference
    #[arg(long, global = true)]
    observations: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the name at a position to its definition and concluded type.
    Resolve {
        /// Location of the name: path:line:col (1-indexed)
        #[arg(long)]
        at: String,
    },

    /// Find every use of the name at a position across the project.
    Occurrences {
        /// Location of the name: path:line:col (1-indexed)
        #[arg(long)]
        at: String,

        /// Also report matches the engine cannot prove either way
        #[arg(long)]
        unsure: bool,
    },

    /// List the classes and functions defined in a module.
    Outline {
        /// Path of the module file
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let root = args.root.as_deref();
    let observations = args.observations.as_deref();

    let outcome = match args.command {
        Commands::Resolve { at } => cli::run_resolve(root, &at, observations),
        Commands::Occurrences { at, unsure } => {
            cli::run_occurrences(root, &at, unsure, observations)
        }
        Commands::Outline { path } => cli::run_outline(root, &path),
    };
    output::emit(outcome)
}
