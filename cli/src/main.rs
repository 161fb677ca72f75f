use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod util;

use commands::chat::{ChatArgs, ConsentCommands, HealthDataArgs};
use commands::inspect::InspectCommands;

#[derive(Parser)]
#[command(
    name = "twin",
    version,
    about = "Health twin CLI: inspect the deterministic pipeline offline or chat with a running API"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "TWIN_API_URL", default_value = "http://localhost:3000", global = true)]
    api_url: String,

    /// Caller user ID, forwarded as the gateway identity header
    #[arg(long, env = "TWIN_USER_ID", global = true)]
    user_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Inspect(InspectCommands),
    /// Check API health
    Health,
    /// Ask the twin a question
    Chat(ChatArgs),
    /// Evaluation summary computed by the API
    Summary {
        #[command(flatten)]
        input: HealthDataArgs,
    },
    /// Open a new chat
    NewChat {
        #[arg(long)]
        title: Option<String>,
    },
    /// Show or change consent
    Consent {
        #[command(subcommand)]
        command: ConsentCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let user_id = cli.user_id.as_deref();

    let code = match cli.command {
        Commands::Inspect(command) => commands::inspect::run(command),
        Commands::Health => commands::health::run(&cli.api_url).await,
        Commands::Chat(args) => commands::chat::chat(&cli.api_url, user_id, args).await,
        Commands::Summary { input } => commands::chat::summary(&cli.api_url, input).await,
        Commands::NewChat { title } => commands::chat::new_chat(&cli.api_url, user_id, title).await,
        Commands::Consent { command } => {
            commands::chat::consent(&cli.api_url, user_id, command).await
        }
    };

    std::process::exit(code);
}
