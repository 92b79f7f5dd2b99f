use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use log::{error, info};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use vigil_core::infrastructure::config::VigilConfig;
use vigil_core::infrastructure::logging::init_logger;
use vigil_core::VigilError;
use vigil_service::setup::{build_state, spawn_nonce_sweeper};

const PASSPHRASE_ENV: &str = "VIGIL_SHARE_PASSPHRASE";

#[derive(Parser)]
#[command(name = "vigild", about = "Threshold validator cosigner daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "vigil.toml")]
    config: PathBuf,

    /// Directory for rolling log files (console only when omitted).
    #[arg(long)]
    log_dir: Option<String>,

    /// Log filters, e.g. "info" or "debug,reqwest=warn".
    #[arg(long, default_value = "info")]
    log_filters: String,
}

fn load_config(path: &PathBuf) -> Result<VigilConfig, VigilError> {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("VIGIL_").split("__"))
        .extract()
        .map_err(|err| VigilError::ConfigError(err.to_string()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.log_dir.as_deref(), &cli.log_filters);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("vigild exited with error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), VigilError> {
    let config = load_config(&cli.config)?;
    let passphrase = SecretString::new(
        std::env::var(PASSPHRASE_ENV).map_err(|_| VigilError::ConfigError(format!("{PASSPHRASE_ENV} is not set")))?,
    );

    let state = build_state(&config, &passphrase)?;
    let sweeper = spawn_nonce_sweeper(state.validator.clone());

    let addr: SocketAddr = config
        .p2p_listen
        .parse()
        .map_err(|err| VigilError::ConfigError(format!("invalid p2p_listen {:?}: {err}", config.p2p_listen)))?;

    info!("starting vigild shard_id={} listen={}", config.shard_id, addr);
    let server = tokio::spawn(vigil_service::api::run_server(addr, state));

    tokio::select! {
        result = server => {
            sweeper.abort();
            result.map_err(|err| VigilError::Message(err.to_string()))?
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            sweeper.abort();
            Ok(())
        }
    }
}
