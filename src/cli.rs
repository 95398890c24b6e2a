//! Command line interface.

use std::path::PathBuf;

use clap::Parser;

/// Modular HTTP/1.1 application server.
#[derive(Parser, Debug)]
#[command(name = "vantage", version, about)]
pub struct Cli {
    /// Path to the KEY=VALUE configuration file.
    #[arg(default_value = "config.conf")]
    pub config: PathBuf,
}
