//! # Agora CLI Module
//!
//! This module implements the CLI interface for Agora.
//!
//! ## Available Commands
//!
//! - `run` - Load a model, run the scheduler to fixpoint, report the result
//! - `check` - Validate a model and show its groups
//! - `inspect` - Print a stored summary file
//! - `archive` - List, show or remove archived runs
//! - `hash` - Compute BLAKE3 cryptographic hash of a summary file

mod commands;

use crate::config::AgoraConfig;
use agora_core::AgoraError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Agora - opportunistic blackboard engine
///
/// Matches the entities of a model against candidate regions produced by
/// external segmentation, one competing worker at a time.
#[derive(Parser, Debug)]
#[command(name = "agora")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Configuration file (defaults to ./agora.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the run archive
    #[arg(short = 'A', long, global = true, default_value = "agora.redb")]
    pub archive: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a model to fixpoint
    Run {
        /// Model file (TOML)
        #[arg(short, long)]
        model: PathBuf,

        /// Directory of `<entity>.json` ROI files (overrides configured roi_dir)
        #[arg(short, long)]
        rois: Option<PathBuf>,

        /// Drop candidates outside this rectangle: x0,y0,x1,y1
        #[arg(short, long)]
        search_area: Option<String>,

        /// Write the run summary here (.json for JSON, anything else binary)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Store the run summary in the archive under this name
        #[arg(short, long)]
        name: Option<String>,

        /// Override the configured activation cap (0 runs until fixpoint)
        #[arg(long)]
        max_activations: Option<usize>,
    },

    /// Validate a model and show how it groups
    Check {
        /// Model file (TOML)
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Print a stored summary file
    Inspect {
        /// Summary file written by `run --output`
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Manage archived runs
    Archive {
        #[command(subcommand)]
        action: ArchiveAction,
    },

    /// Compute BLAKE3 cryptographic hash of a summary file
    Hash {
        /// Summary file written by `run --output`
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// Archive operations.
#[derive(Subcommand, Debug)]
pub enum ArchiveAction {
    /// List archived run names
    List,

    /// Print an archived run
    Show {
        /// Run name
        name: String,
    },

    /// Delete an archived run
    Remove {
        /// Run name
        name: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), AgoraError> {
    let json_mode = cli.json_mode;
    let mut config = AgoraConfig::resolve(cli.config.as_deref())?;
    if cli.verbose {
        tracing::info!(?config, "configuration loaded");
    }

    match cli.command {
        Commands::Run {
            model,
            rois,
            search_area,
            output,
            name,
            max_activations,
        } => {
            if let Some(cap) = max_activations {
                config.scheduler.max_activations = cap;
            }
            let options = RunOptions {
                rois,
                search_area: search_area.as_deref().map(parse_search_area).transpose()?,
                output,
                archive_as: name,
            };
            cmd_run(&config, &cli.archive, json_mode, &model, &options)
        }
        Commands::Check { model } => cmd_check(&config, json_mode, &model),
        Commands::Inspect { input } => cmd_inspect(json_mode, &input),
        Commands::Archive { action } => match action {
            ArchiveAction::List => cmd_archive_list(&cli.archive, json_mode),
            ArchiveAction::Show { name } => cmd_archive_show(&cli.archive, json_mode, &name),
            ArchiveAction::Remove { name } => cmd_archive_remove(&cli.archive, &name),
        },
        Commands::Hash { input } => cmd_hash(json_mode, &input),
    }
}
