// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use oracle_relayer::afc::{AfcApi, AfcExecutor};
use oracle_relayer::alert::Alerter;
use oracle_relayer::api;
use oracle_relayer::config::{Config, LogConfig, KEY_TYPE_STORE_MNEMONIC};
use oracle_relayer::observer::PackageObserver;
use oracle_relayer::relayer::RelayEngine;
use oracle_relayer::secrets::SecretStore;
use oracle_relayer::state::AppState;
use oracle_relayer::store::ClaimStore;

const USAGE: &str = "\
Usage: oracle-relayer [OPTIONS]

Options:
  --config-type <local|store>     Where the config document lives (default: local)
  --config-path <FILE>            Path to the JSON config (config-type local)
  --config-secret-name <NAME>     Secret holding the JSON config (config-type store)
  --config-secret-region <REGION> Region of the config secret (config-type store)
  -h, --help                      Print this help";

struct Args {
    config_type: String,
    config_path: Option<PathBuf>,
    config_secret_name: Option<String>,
    config_secret_region: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config_type: "local".to_string(),
        config_path: None,
        config_secret_name: None,
        config_secret_region: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config-type" => {
                args.config_type = iter
                    .next()
                    .ok_or_else(|| "--config-type requires a value".to_string())?;
            }
            "--config-path" => {
                args.config_path = Some(PathBuf::from(
                    iter.next()
                        .ok_or_else(|| "--config-path requires a value".to_string())?,
                ));
            }
            "--config-secret-name" => {
                args.config_secret_name = Some(
                    iter.next()
                        .ok_or_else(|| "--config-secret-name requires a value".to_string())?,
                );
            }
            "--config-secret-region" => {
                args.config_secret_region = Some(
                    iter.next()
                        .ok_or_else(|| "--config-secret-region requires a value".to_string())?,
                );
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument {other:?}")),
        }
    }

    Ok(args)
}

/// Load the config document from the location the flags point at.
async fn load_config(args: &Args) -> Result<Config, String> {
    match args.config_type.as_str() {
        "local" => {
            let path = args
                .config_path
                .as_deref()
                .ok_or_else(|| "--config-path is required with --config-type local".to_string())?;
            Config::from_file(path).map_err(|e| e.to_string())
        }
        "store" => {
            let name = args.config_secret_name.as_deref().ok_or_else(|| {
                "--config-secret-name is required with --config-type store".to_string()
            })?;
            let region = args.config_secret_region.as_deref().ok_or_else(|| {
                "--config-secret-region is required with --config-type store".to_string()
            })?;
            let store = SecretStore::from_env().map_err(|e| e.to_string())?;
            let raw = store
                .get_secret(name, region)
                .await
                .map_err(|e| e.to_string())?;
            Config::from_json(&raw).map_err(|e| e.to_string())
        }
        other => Err(format!("unsupported --config-type {other:?}")),
    }
}

fn init_tracing(log_config: &LogConfig) {
    let filter = EnvFilter::try_new(&log_config.filter)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log_config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let args = parse_args().unwrap_or_else(|e| {
        eprintln!("{e}\n{USAGE}");
        std::process::exit(2);
    });

    let mut config = load_config(&args).await.unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}");
        std::process::exit(1);
    });
    // A partial config must never come up; treat any validation error as fatal
    if let Err(e) = config.validate() {
        eprintln!("Failed to validate config: {e}");
        std::process::exit(1);
    }

    init_tracing(&config.log_config);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        moniker = %config.alert_config.moniker,
        "Oracle relayer starting"
    );

    let config = Arc::new(config);
    let store = Arc::new(
        ClaimStore::open(Path::new(&config.db_config.path)).expect("Failed to open claim store"),
    );
    let alerter = Arc::new(Alerter::new(config.alert_config.clone()));

    let secrets = if config.chain_config.afc_key_type == KEY_TYPE_STORE_MNEMONIC {
        Some(SecretStore::from_env().expect("SECRET_STORE_URL must be set for store_mnemonic"))
    } else {
        None
    };

    let executor = Arc::new(
        AfcExecutor::new(config.chain_config.clone(), secrets)
            .expect("Failed to build AFC executor"),
    );
    let relayer_address = match executor.relayer_address().await {
        Ok(address) => {
            tracing::info!(address = %address, "Relayer signing address resolved");
            Some(address)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not resolve relayer address at startup");
            None
        }
    };
    let observer = PackageObserver::new(store.clone(), alerter.clone(), config.chain_config.clone())
        .expect("Failed to build package observer");
    let engine = RelayEngine::new(
        store.clone(),
        executor,
        alerter.clone(),
        config.chain_config.clone(),
        config.alert_config.clone(),
    );

    let shutdown = CancellationToken::new();
    let observer_task = tokio::spawn(observer.run(shutdown.clone()));
    let relay_task = tokio::spawn(engine.run(shutdown.clone()));

    let state = AppState::new(store, config.clone(), relayer_address);
    let app = api::router(state);
    let listener = TcpListener::bind(&config.admin_config.listen_addr)
        .await
        .expect("Failed to bind admin listener");
    tracing::info!(
        addr = %config.admin_config.listen_addr,
        "Admin listener up (docs at /docs)"
    );

    let signal_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown signal received");
            signal_shutdown.cancel();
        })
        .await
        .expect("Admin listener failed");

    // Stop the loops even if serve returned without a signal
    shutdown.cancel();
    let _ = observer_task.await;
    let _ = relay_task.await;
    tracing::info!("Oracle relayer stopped");
}
