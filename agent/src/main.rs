use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::signal;

mod app;
mod audit;
mod auth;
mod backend;
mod dashboard;
mod devices;
mod error;
mod feeds;
mod ipc;
mod notify;
mod policies;
mod session;
mod storage;
mod sync;
#[cfg(test)]
mod testing;

use app::App;
use common::Config;
use ipc::start_ipc_server;

#[derive(Parser, Debug)]
#[command(name = "ztd-agent")]
#[command(about = "Zero-trust dashboard agent", long_about = None)]
struct Args {
    /// Config file (defaults to $ZTD_CONFIG or ./config/default.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the IPC socket path
    #[arg(short, long)]
    socket: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting ztd agent");

    // Load configuration
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;
    if let Some(socket) = args.socket {
        config.ipc.socket_path = socket;
    }
    info!("Config loaded from {}", config_path);

    let socket_path = config.ipc.socket_path.clone();
    let app = Arc::new(App::start(config).await?);

    let server = start_ipc_server(app.clone(), socket_path.clone()).await?;
    info!("IPC server started on {}", socket_path);

    info!("ztd agent is running");

    // Wait for ctrl-c
    signal::ctrl_c().await?;
    server.abort();
    app.shutdown().await;
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}
