//! VIP agent binary

use agent::{Agent, Config, LogFormat, Signals, tls};
use election::{ConnectOptions, EtcdCoordinator};
use netif::{InterfaceBinder, NetlinkAddressTable};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            common::logging::init();
            error!(error = %e, "Configuration error");
            return ExitCode::FAILURE;
        }
    };

    match config.log_format {
        LogFormat::Text => common::logging::init(),
        LogFormat::Json => common::logging::init_json(),
    }

    match run(config).await {
        Ok(()) => {
            info!("VIP agent stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "VIP agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> common::Result<()> {
    let tls = tls::load(&config.tls).await?;
    let options = ConnectOptions::new()
        .with_tls(tls)
        .with_connect_timeout(config.dial_timeout);

    info!(endpoints = ?config.endpoints, "Connecting to etcd");
    let coordinator = EtcdCoordinator::connect(&config.endpoints, options).await?;
    let binder = InterfaceBinder::new(Arc::new(NetlinkAddressTable::new()?));

    // Installed before campaigning so an early signal is not lost
    let signals = Signals::install()?;
    let shutdown = async move {
        let name = signals.wait().await;
        info!(signal = name, "Termination signal received");
    };

    Agent::new(config.settings(), Arc::new(coordinator), binder)
        .run(shutdown)
        .await
}
