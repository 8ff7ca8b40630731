use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod util;
mod vapi;

use commands::agent::AgentCommands;
use commands::booking::BookingCommands;
use commands::call::CallCommands;
use commands::lead::LeadCommands;
use commands::org::OrgCommands;

#[derive(Parser)]
#[command(name = "voxlead", version, about = "Voxlead admin CLI")]
struct Cli {
    /// API base URL
    #[arg(long, env = "VOXLEAD_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Organization bootstrap
    Org {
        #[command(subcommand)]
        command: OrgCommands,
    },
    /// Agent bootstrap and voice-platform tools
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Inspect recorded calls
    Call {
        #[command(subcommand)]
        command: CallCommands,
    },
    /// Inspect leads
    Lead {
        #[command(subcommand)]
        command: LeadCommands,
    },
    /// Inspect bookings recorded against calls
    Booking {
        #[command(subcommand)]
        command: BookingCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Diagnostics go to stderr so stdout stays machine-readable JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Health => commands::health::run(&cli.api_url).await,
        Commands::Org { command } => commands::org::run(command).await,
        Commands::Agent { command } => commands::agent::run(command).await,
        Commands::Call { command } => commands::call::run(command).await,
        Commands::Lead { command } => commands::lead::run(command).await,
        Commands::Booking { command } => commands::booking::run(command).await,
    };

    std::process::exit(code);
}
