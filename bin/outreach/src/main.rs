mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "outreach")]
#[command(about = "Paced profile engagement worker for a dedicated browser tab", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engagement worker and its HTTP gateway (long-running daemon)
    Serve {
        /// Port to listen on (overrides config gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Show the persisted session and today's counters
    Status,

    /// Erase persisted engagement state
    Reset {
        /// Also reset the daily engagement counters
        #[arg(long)]
        stats: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Get a config value by dot-separated key (e.g. engagement.dailyLimit)
    Get {
        key: String,
    },
    /// Set a config value by dot-separated key
    Set {
        key: String,
        /// Value to set (auto-detects JSON types)
        value: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { port, host } => {
            commands::serve::run(host, port).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Reset { stats } => {
            commands::reset::run(stats).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::config_cmd::show().await?;
            }
            ConfigCommands::Init { force } => {
                commands::config_cmd::init(force).await?;
            }
            ConfigCommands::Get { key } => {
                commands::config_cmd::get(&key).await?;
            }
            ConfigCommands::Set { key, value } => {
                commands::config_cmd::set(&key, &value).await?;
            }
        },
    }

    Ok(())
}
