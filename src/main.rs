mod auth;
mod catalog;
mod config;
mod http;
mod logging;
mod login;
mod mirror;
mod models;
mod quickxor;
mod reconcile;
mod refresh;
mod service;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "drive-mirror", version)]
struct Cli {
    /// Path to config file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authorize the application and store the OAuth2 tokens
    Login,

    /// Run the mirroring service until killed
    Service,

    /// Print the resolved config file path
    ConfigPath,

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = Config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Login => login::run_login(login::LoginArgs { config_path }).await,
        Commands::Service => {
            let cfg = Config::load(&config_path)?;
            logging::init_log_file(&cfg.log_path())?;
            logging::info_kv(
                "service start",
                &[
                    ("version", env!("CARGO_PKG_VERSION")),
                    ("config", &config_path.display().to_string()),
                ],
            );
            service::run_service(&cfg).await
        }
        Commands::ConfigPath => {
            println!("{}", config_path.display());
            Ok(())
        }
        Commands::Version => {
            println!("drive-mirror {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
