//! Gateway server binary

use clap::{Parser, Subcommand};
use sentry_mcp::{Config, init_logging};

#[derive(Parser)]
#[command(name = "sentry-mcp", version, about = "Stateless MCP gateway for Sentry")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        /// Bind host
        #[arg(long, env = "HOST", default_value = "127.0.0.1")]
        host: String,

        /// Bind port
        #[arg(long, env = "PORT", default_value_t = 8788)]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env before anything reads the environment.
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Serve {
        host: "127.0.0.1".to_string(),
        port: 8788,
    }) {
        Command::Serve { host, port } => {
            match Config::from_env() {
                Ok(mut config) => {
                    config.http_host = host;
                    config.http_port = port;
                    sentry_mcp::http::start_server(config).await
                }
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        tracing::error!("fatal: {}", e);
        std::process::exit(1);
    }
}
