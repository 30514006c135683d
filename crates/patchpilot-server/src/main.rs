//! `patchpilot` command-line entry point.

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{debug, info};
use patchpilot_config::PatchPilotConfig;
use patchpilot_server::{AppState, init_logging, serve};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line options for the PatchPilot gateway.
#[derive(Parser)]
#[command(name = "patchpilot", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        /// Optional path to a patchpilot.json5 config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Listen address, overriding server.bind
        #[arg(long)]
        bind: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PatchPilotConfig> {
    let mut config = if let Some(path) = path {
        info!("loading config from path: {}", path.display());
        PatchPilotConfig::load_from_path(path).context("failed to load config")?
    } else {
        let cwd = std::env::current_dir().context("failed to resolve cwd")?;
        info!("loading layered config from cwd: {}", cwd.display());
        let layered =
            PatchPilotConfig::load_layered(&cwd).context("failed to load layered config")?;
        debug!("layered config loaded (layers={})", layered.layers.len());
        layered.config
    };
    config
        .apply_env()
        .context("invalid environment override")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config, bind } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(bind) = bind {
                config.server.bind = bind;
                config.validate().context("invalid --bind")?;
            }
            let addr: SocketAddr = config
                .server
                .bind
                .parse()
                .with_context(|| format!("invalid bind address {}", config.server.bind))?;
            let state = AppState::from_config(&config)?;
            serve(Arc::new(state), addr).await
        }
    }
}
