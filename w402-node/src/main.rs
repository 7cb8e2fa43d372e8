//! `w402-node` binary: a payment gate server and a paying HTTP client.
//!
//! # Usage
//!
//! ```bash
//! # Serve the gates described in w402.json
//! w402-node serve --config w402.json
//!
//! # Fetch a resource, paying a 402 challenge with EVM_PRIVATE_KEY
//! EVM_PRIVATE_KEY=0x... w402-node fetch https://api.example.com/weather
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Gate configuration file (default: `w402.json`)
//! - `HOST` / `PORT` - Override the bind address
//! - `EVM_PRIVATE_KEY` - Payer key for `fetch`
//! - `RUST_LOG` - Log level filter (default: `info`)

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use url::Url;
use w402::node::{Node, StaticContext};
use w402_evm::RpcNetworkProvider;
use w402_http::facilitator::FacilitatorClient;

use w402_node::config::NodeConfig;
use w402_node::nodes::RequestNode;
use w402_node::payment::EVM_PRIVATE_KEY_CREDENTIAL;
use w402_node::server::{GateState, gate_router};
use w402_node::util::SigDown;

#[derive(Parser, Debug)]
#[command(name = "w402-node", version)]
#[command(about = "x402 payment gate server and paying HTTP client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve payment-gated routes.
    Serve(ServeArgs),
    /// Request a URL, paying a 402 challenge once.
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Configuration file.
    #[arg(long, short, env = "CONFIG", default_value = w402_node::config::DEFAULT_CONFIG_PATH)]
    config: String,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Target URL.
    url: String,
    /// HTTP method.
    #[arg(long, short = 'X', default_value = "GET")]
    method: String,
    /// Extra header as `name:value`; repeatable.
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,
    /// JSON body for POST, PUT and PATCH.
    #[arg(long, short)]
    body: Option<String>,
    /// Request timeout in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
    /// RPC endpoint used for every network instead of the built-in ones.
    #[arg(long)]
    rpc_url: Option<Url>,
    /// Check the payer's token balance before signing.
    #[arg(long)]
    check_balance: bool,
    /// Payer key.
    #[arg(long, env = "EVM_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Fetch(args) => fetch(args).await,
    };
    if let Err(e) = result {
        tracing::error!("w402-node failed: {e}");
        std::process::exit(1);
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = NodeConfig::load_from(&args.config)?;
    let registry = Arc::new(config.registry()?);
    tracing::info!(
        host = %config.host,
        port = config.port,
        gates = config.gates.len(),
        networks = ?registry.ids(),
        "Loaded configuration"
    );
    if config.gates.is_empty() {
        tracing::warn!("No gates configured, only /health is served");
    }

    let facilitator = match config.facilitator_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => {
            let client = FacilitatorClient::try_from(url)?
                .with_bearer(config.facilitator_api_key.as_deref().unwrap_or_default())?;
            tracing::info!(url = %client.base_url(), "Using facilitator");
            Some(client)
        }
        _ => {
            tracing::warn!("No facilitator configured, payments are accepted unverified");
            None
        }
    };

    let sig_down = SigDown::try_new()?;
    let shutdown = sig_down.cancellation_token();
    let state = GateState::new(registry, shutdown.clone())
        .with_facilitator(facilitator)
        .with_public_url(config.public_url.clone());
    let app = gate_router(config.gates, &state)?
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
                .allow_headers(cors::Any)
                .expose_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gate listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    sig_down.recv().await;

    tracing::info!("Gate shut down gracefully");
    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let headers: Vec<Value> = args
        .headers
        .iter()
        .filter_map(|header| header.split_once(':'))
        .map(|(name, value)| json!({"name": name.trim(), "value": value.trim()}))
        .collect();
    let mut ctx = StaticContext::single()
        .with_parameter("method", args.method.to_ascii_uppercase())
        .with_parameter("url", args.url)
        .with_parameter("headers", json!({"header": headers}))
        .with_parameter(
            "options",
            json!({"timeout": args.timeout_ms, "checkBalance": args.check_balance}),
        );
    if let Some(body) = args.body {
        ctx = ctx.with_parameter("body", body);
    }
    if let Some(key) = args.private_key {
        ctx = ctx.with_credential(EVM_PRIVATE_KEY_CREDENTIAL, json!({"privateKey": key}));
    }

    let sig_down = SigDown::try_new()?;
    let ctx = ctx.with_cancellation(sig_down.cancellation_token());
    let networks = RpcNetworkProvider::new(Arc::new(w402_evm::networks::default_registry()))
        .with_custom_rpc(args.rpc_url);
    let outputs = RequestNode::new(Arc::new(networks)).execute(&ctx).await?;

    let mut stdout = std::io::stdout().lock();
    for item in outputs.iter().flatten() {
        writeln!(stdout, "{}", serde_json::to_string_pretty(item)?)?;
    }
    Ok(())
}
