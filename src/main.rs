//! Huddle Server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Settings come from a TOML file (see `huddle config`) with environment
//! overrides:
//! - `HUDDLE_HOST`, `HUDDLE_PORT`: Listen address (default: 0.0.0.0:8080)
//! - `HUDDLE_JWT_KEY`: Token secret (required)
//! - `HUDDLE_QUEUE_CAPACITY`: Per-connection outbound queue (default: 512)
//! - `HUDDLE_GRACE_PERIOD_MS`: Empty-session grace period (default: 5000)
//! - `HUDDLE_LOG_LEVEL`, `HUDDLE_LOG_FORMAT`: Logging
//! - `RUST_LOG`: Overrides the log filter entirely

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use huddle::api::{serve, AppState};
use huddle::config::{generate_default_config, Config, LoggingConfig};
use huddle::identity::{InMemoryUserDirectory, JwtIdentityResolver, TokenVerifier};
use huddle::session::SessionRegistry;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Realtime presence and content relay for collaborative sessions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the WebSocket server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Mint an identity token for local testing
    Token {
        /// Subject (user email) to put in the token
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote default config to {}", path.display());
                }
                None => print!("{}", content),
            }
            Ok(())
        }
        Commands::Token { email } => {
            let config = load_config(cli.config.as_deref())?;
            config.validate()?;
            let verifier = token_verifier(&config);
            println!("{}", verifier.issue(&email)?);
            Ok(())
        }
        Commands::Serve { host, port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await
        }
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    init_tracing(&config.logging);
    config.validate()?;

    tracing::info!("Starting Huddle v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        queue_capacity = config.hub.queue_capacity,
        grace_period_ms = config.hub.grace_period_ms,
        users = config.users.len(),
        "Session hub settings"
    );

    let verifier = Arc::new(token_verifier(&config));
    let directory = Arc::new(InMemoryUserDirectory::from_entries(&config.users));
    let resolver = Arc::new(JwtIdentityResolver::new(verifier, directory));
    let registry = Arc::new(SessionRegistry::new(config.hub.clone()));

    serve(AppState::new(registry, resolver), &config.server).await?;

    tracing::info!("Huddle stopped");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load_with_env(path)?),
        None => Ok(Config::load_default()),
    }
}

fn token_verifier(config: &Config) -> TokenVerifier {
    TokenVerifier::new(
        config.auth.jwt_secret.as_bytes(),
        chrono::Duration::hours(config.auth.token_ttl_hours),
    )
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("huddle={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
