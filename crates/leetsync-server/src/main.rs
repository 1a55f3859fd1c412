use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use actix_web::web;
use leetsync_core::{paths, SyncConfig};
use leetsync_server::logging::init_logging;
use leetsync_server::{run_server, AppState};

#[derive(Parser, Debug, Clone)]
#[command(name = "leetsync-server")]
#[command(about = "Commits accepted LeetCode solutions to GitHub")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Server port
    #[arg(long, env = "LEETSYNC_PORT", default_value = "8765")]
    port: u16,

    /// Config file (defaults to ~/.leetsync/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding store.json (defaults to ~/.leetsync)
    #[arg(long, env = "LEETSYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// OAuth app client id
    #[arg(long)]
    client_id: Option<String>,

    /// Never open a browser for the verification page
    #[arg(long)]
    headless: bool,

    /// Log level (overrides debug flag)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::load_from(path),
            None => {
                paths::ensure_leetsync_dir().context("Failed to create ~/.leetsync")?;
                SyncConfig::load()
            }
        };

        if let Some(dir) = &self.data_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data dir {:?}", dir))?;
            config.store_path = Some(dir.join("store.json"));
        }
        if let Some(client_id) = &self.client_id {
            config.client_id = client_id.clone();
        }
        if self.headless {
            config.headless = true;
        }
        Ok(config)
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_level.is_some() {
        env_logger::init();
    } else {
        init_logging(cli.debug);
    }

    let config = cli.resolve_config()?;
    log::info!("Starting LeetSync on port {}", cli.port);
    log::debug!("Login base: {}", config.login_base());
    log::debug!("API base: {}", config.api_base());
    log::debug!("Store: {:?}", config.store_path());

    let state = AppState::from_config(&config)
        .await
        .context("Failed to initialize application state")?;

    run_server(cli.port, web::Data::new(state))
        .await
        .context("HTTP server failed")
}
