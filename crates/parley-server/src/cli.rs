//! Command line arguments.

use clap::Parser;
use std::path::PathBuf;

/// Parley realtime presence and message relay server.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version)]
#[command(about, long_about = None)]
pub struct Cli {
    /// Configuration file (skips the default search path)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
