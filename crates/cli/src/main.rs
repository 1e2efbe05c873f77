//! StudyKit CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write the default config file
//! - `serve`   — Start the HTTP study service
//! - `status`  — Show configuration summary
//! - `doctor`  — Diagnose setup problems

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "studykit",
    about = "StudyKit — AI study companion service",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Start the HTTP study service
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show configuration summary
    Status,

    /// Diagnose setup problems
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
