mod config;
mod stdio;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use orchestrator_protocol::ToolFacade;
use stdio::StdioServer;
use telemetry::{init_telemetry, log_config_validation, log_startup_info};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "orchestrator-server")]
#[command(about = "Multi-project, multi-agent task orchestration engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Repository root (`.cursor/rules/`, `agent-library/`, git working
    /// tree). Overrides the detection order in `config::detect_project_root`.
    #[arg(long, env = "PROJECT_ROOT_PATH")]
    project_root: Option<String>,

    /// Root for `tasks/`, `contexts/` and `projects.json`.
    #[arg(long, env = "BRAIN_DIR_PATH")]
    data_root: Option<String>,

    /// Log level override.
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;

    if let Some(ref project_root) = cli.project_root {
        config.paths.project_root = std::path::PathBuf::from(project_root.clone());
    }
    if let Some(ref data_root) = cli.data_root {
        config.paths.data_root = std::path::PathBuf::from(data_root.clone());
    }
    if let Some(ref log_level) = cli.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli).context("failed to load configuration")?;

    init_telemetry(&config.logging).context("failed to initialize telemetry")?;
    log_config_validation(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "configuration validation failed");
        std::process::exit(1);
    }

    log_startup_info(&config);

    let facade = ToolFacade::new(config.paths.data_root.clone(), config.paths.project_root.clone());
    let server = StdioServer::new(facade);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
            let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
                .expect("failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
                _ = sigint.recv() => info!("received SIGINT, initiating graceful shutdown"),
            }
        }

        #[cfg(windows)]
        {
            tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
            info!("received Ctrl+C, initiating graceful shutdown");
        }

        let _ = shutdown_tx.send(());
    });

    tokio::select! {
        result = server.serve() => {
            result.context("stdio server error")?;
            info!("orchestrator server shut down cleanly");
        }
        _ = shutdown_rx => {
            info!("shutdown signal received, stopping server");
        }
    }

    Ok(())
}
