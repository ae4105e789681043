//! Stencil CLI - static site generator for JSON content and minijinja templates.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use config::ConfigFile;

#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Static site generator for JSON content and minijinja templates")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to site.toml config file
    #[arg(short, long, default_value = "site.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the static site
    Build {
        /// Output directory (defaults to config or "dist")
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate page content against the page schema
    Validate {
        /// Schemas directory (defaults to config or "content/schemas")
        #[arg(short, long)]
        schemas: Option<PathBuf>,
    },

    /// Start development server with rebuild on change
    Dev {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Preview a built site
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// Directory to serve (defaults to config or "dist")
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let file_config = ConfigFile::load(&cli.config)?;

    // Execute command
    match cli.command {
        Commands::Build { output } => {
            commands::build::run(&file_config, output)?;
        }
        Commands::Validate { schemas } => {
            if !commands::validate::run(&file_config, schemas)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Dev { port, no_open } => {
            commands::dev::run(&file_config, &cli.config, port, !no_open).await?;
        }
        Commands::Serve { port, dir } => {
            let dir = dir.unwrap_or_else(|| file_config.paths.output.clone());
            commands::serve::run(port, dir).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
