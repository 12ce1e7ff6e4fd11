//! Aquifer Advisor - Main Server
//!
//! Multi-agent CO2 storage site advisory service backed by Neo4j and Ollama.

use anyhow::Result;
use aquifer_advisor::workflow::run_workflow;
use aquifer_advisor::{api, AppState, Config};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "advisor")]
#[command(about = "Aquifer CO2 storage advisory server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Answer a single question from the command line
    Ask {
        /// The question to answer
        query: String,

        /// Include query details and the execution trace
        #[arg(long)]
        expert: bool,

        /// Session id to attribute the question to
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aquifer_advisor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => {
            config.server_port = port;
            let state = AppState::new(config).await?;
            tracing::info!("Connected to Neo4j");
            api::serve(state, port).await
        }
        Commands::Ask {
            query,
            expert,
            session,
        } => run_ask(config, &query, expert, session).await,
    }
}

async fn run_ask(
    config: Config,
    query: &str,
    expert: bool,
    session: Option<String>,
) -> Result<()> {
    let state = AppState::new(config).await?;
    tracing::info!("Connected to Neo4j");

    let result = run_workflow(&state, query, session, expert).await;

    match result.final_response {
        Some(response) => println!("{}", response),
        None => println!("I apologize, but I couldn't generate a response."),
    }

    Ok(())
}
