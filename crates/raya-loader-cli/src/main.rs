//! Raya unit loader CLI
//!
//! Resolves units through a configured loader and reports what was
//! materialized, where it came from and who signed it.

use clap::{Parser, Subcommand};
use raya_loader_cli::{commands, output, setup};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "RAYA_LOG";

#[derive(Parser)]
#[command(name = "raya-loader")]
#[command(about = "Resolve and inspect Raya code units", long_about = None)]
#[command(version)]
struct Cli {
    /// Loader configuration file (defaults to ./raya-loader.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extra search-path entry (directory or unit archive), may be repeated
    #[arg(short, long = "path", global = true)]
    paths: Vec<PathBuf>,

    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve units and report what was materialized
    Resolve {
        /// Dotted unit names
        #[arg(required = true)]
        names: Vec<String>,
        /// Print a JSON report
        #[arg(long)]
        json: bool,
    },

    /// Show size and SHA-256 of a unit's untransformed bytes
    Raw {
        /// Dotted unit name
        name: String,
        /// Read through the host runtime's search path
        #[arg(long)]
        host: bool,
    },

    /// List load and transform exemptions
    Exemptions,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let choice = output::resolve_color_choice(cli.color.as_deref());
    let options = setup::LoaderOptions {
        config: cli.config,
        paths: cli.paths,
    };

    match cli.command {
        Commands::Resolve { names, json } => {
            let ok = commands::resolve::execute(&options, &names, json, choice)?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Raw { name, host } => commands::raw::execute(&options, &name, host)?,
        Commands::Exemptions => commands::exemptions::execute(&options, choice)?,
    }

    Ok(())
}
