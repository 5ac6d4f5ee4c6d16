use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::config::AppConfig;
use crate::core::gateway::HttpGatewayClient;
use crate::core::retention;
use crate::core::store::TaskStore;
use crate::core::workspace::HttpWorkspaceClient;
use crate::interfaces::web::{ApiServer, AppState};
use crate::logging::BroadcastMakeWriter;

const DEFAULT_API_HOST: &str = "127.0.0.1";
const DEFAULT_API_PORT: u16 = 8790;

pub(crate) async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None | Some("serve") => {
            let (api_host, api_port) = parse_serve_args(&args, 2);
            serve(api_host, api_port).await
        }
        Some("purge") => purge_once().await,
        Some("help" | "--help" | "-h") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            print_help();
            Err(anyhow!("unknown command: {}", other))
        }
    }
}

pub(crate) fn parse_serve_args(args: &[String], start: usize) -> (String, u16) {
    let mut api_host = DEFAULT_API_HOST.to_string();
    let mut api_port = DEFAULT_API_PORT;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = args[i + 1].clone();
                    i += 1;
                }
            }
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().unwrap_or(DEFAULT_API_PORT);
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    (api_host, api_port)
}

async fn serve(api_host: String, api_port: u16) -> Result<()> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(500);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(BroadcastMakeWriter {
            sender: log_tx.clone(),
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let config = AppConfig::from_env()?;
    info!(
        "Starting mosbot task API (data dir: {})",
        config.data_dir.display()
    );

    let store = Arc::new(TaskStore::open(&config.data_dir).await?);
    let workspace = Arc::new(HttpWorkspaceClient::new(
        config.workspace_url.clone(),
        config.workspace_token.clone(),
    ));
    let gateway = Arc::new(HttpGatewayClient::new(config.gateway_url.clone()));

    // Scheduler handle must stay alive for the daily purge to keep firing.
    let _scheduler = retention::start_purge_scheduler(store.clone(), config.retention).await?;

    let state = AppState {
        store,
        workspace,
        gateway,
        retention: config.retention,
        log_tx,
        api_host,
        api_port,
        internal_token: internal_token(),
    };
    ApiServer::new(state).run().await
}

async fn purge_once() -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = TaskStore::open(&config.data_dir).await?;
    let removed = retention::run_purge(&store, &config.retention).await?;
    println!("Removed {} expired activity entries", removed);
    Ok(())
}

fn internal_token() -> String {
    match std::env::var("MOSBOT_INTERNAL_TOKEN") {
        Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
        _ => {
            let bytes: [u8; 16] = rand::random();
            hex::encode(bytes)
        }
    }
}

fn print_help() {
    println!("mosbot - task management API with subagent status aggregation");
    println!();
    println!("Usage:");
    println!("  mosbot serve [--api-host H] [--api-port P]   Start the API server (default)");
    println!("  mosbot purge                                 Delete expired activity entries once");
    println!("  mosbot help                                  Show this help");
}
