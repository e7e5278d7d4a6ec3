// bslice - Backward Slicing Toolkit
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! bslice - Backward Slicing Toolkit
//!
//! Command line access to persisted trace directories.

use std::path::PathBuf;

use bslice_common::{logging, TraceConfig, ValueKind};
use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};

mod cmd;

use cmd::{dump_trace, inspect_trace, record_values, show_config};

/// Command-line interface for bslice
#[derive(Debug, Parser)]
#[command(name = "bslice")]
#[command(about = "Backward Slicing Toolkit - inspect and replay recorded value traces")]
#[command(version)]
pub struct Cli {
    /// Trace configuration file (TOML)
    #[arg(long, global = true, env = "BSLICE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to a rolling file under the system temp directory
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the threads and sequences of a trace directory
    Inspect {
        /// Trace directory
        dir: PathBuf,

        /// Replay every sequence to count its values
        #[arg(long)]
        count: bool,
    },
    /// Print replayed values, most recent first
    Dump {
        /// Trace directory
        dir: PathBuf,

        /// Only dump this thread
        #[arg(long)]
        thread: Option<u64>,

        /// Print at most this many values per sequence
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Record whitespace-separated values into a new trace directory
    Record {
        /// Trace directory to create
        dir: PathBuf,

        /// Thread the values belong to
        #[arg(long, default_value = "0")]
        thread: u64,

        /// Value kind (int or long)
        #[arg(long, default_value = "int")]
        kind: ValueKind,

        /// Read values from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the effective trace configuration
    Config,
}

impl Cli {
    /// Configuration from `--config`, or the defaults
    pub fn trace_config(&self) -> Result<TraceConfig> {
        match &self.config {
            Some(path) => TraceConfig::load(path),
            None => Ok(TraceConfig::default()),
        }
    }
}

fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    logging::init_logging("bslice", cli.log_file)?;

    match &cli.command {
        Commands::Inspect { dir, count } => {
            tracing::info!("Inspecting trace directory {}", dir.display());
            inspect_trace(dir, *count)
        }
        Commands::Dump { dir, thread, limit } => {
            tracing::info!("Dumping trace directory {}", dir.display());
            dump_trace(dir, *thread, *limit)
        }
        Commands::Record { dir, thread, kind, input } => {
            let config = cli.trace_config()?;
            tracing::info!("Recording {} values into {}", kind, dir.display());
            record_values(dir, *thread, *kind, input.as_deref(), config)
                .wrap_err_with(|| format!("Failed to record into {}", dir.display()))
        }
        Commands::Config => show_config(&cli.trace_config()?),
    }
}
