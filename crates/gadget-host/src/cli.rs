//! Command-line surface of the demo host.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// gadget-host: drive a UI gadget through its lifecycle from the shell
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Override the gadget search directories (repeatable)
    #[arg(long = "module-dir", global = true)]
    pub module_dirs: Vec<PathBuf>,

    /// Package identity used for the package-private search directories
    #[arg(long, global = true)]
    pub package: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the candidate library paths a gadget name resolves through
    Probe {
        /// The gadget name
        name: String,
    },
    /// Check whether a gadget is installed
    Exists {
        /// The gadget name
        name: String,
    },
    /// Load a gadget and run it through a scripted lifecycle
    Run {
        /// The gadget name
        name: String,

        /// Embed as frameview instead of fullview
        #[arg(long)]
        frameview: bool,

        /// Launch-request extras, key=value (repeatable)
        #[arg(long = "extra", value_parser = parse_extra)]
        extras: Vec<(String, String)>,

        /// Load a display engine from this path instead of the default
        #[arg(long = "engine-path")]
        engine_path: Option<PathBuf>,
    },
}

fn parse_extra(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}
