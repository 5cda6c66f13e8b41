use clap::{Parser, Subcommand};
use eyebreak_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod notifier;

#[derive(Parser)]
#[command(name = "eyebreak-cli", version, about = "Eyebreak break reminder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background worker, speaking JSON lines on stdin/stdout
    Run,
    /// Write default settings and arm the first break
    Install {
        /// Keep existing values, only fill in new keys
        #[arg(long)]
        update: bool,
    },
    /// Print the persisted schedule as JSON
    Status,
    /// Print break statistics and pet progress as JSON
    Stats,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(Config::load_or_default().logging.filter)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run => commands::run::run().await,
        Commands::Install { update } => commands::install::run(update).await,
        Commands::Status => commands::status::run().await,
        Commands::Stats => commands::stats::run().await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    // The stdin reader thread cannot be cancelled; do not wait for it.
    std::process::exit(0);
}
