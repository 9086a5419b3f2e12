// bin/plantmon.rs

use std::sync::Arc;

use clap::Parser;
use log::*;
use plantmon::*;
use tokio::signal::unix::{signal, SignalKind};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = MyConfig::parse();
    info!("plantmon {FW_VERSION} starting up.");
    info!("My config:\n{config:#?}");

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(Box::pin(run(config)))
}

async fn run(config: MyConfig) -> anyhow::Result<()> {
    let hw = open_linux(&config)?;
    let classifier = PlantIdClient::from_config(&config)?;
    let (shadow, eventloop) = connect_mqtt(&config)?;
    let state = Arc::new(MyState::new(config.clone()));

    let mut monitor = Monitor::new(
        hw,
        classifier,
        shadow.clone(),
        state.clone(),
        MonitorSettings::from(&config),
    );

    info!("Entering main loop...");
    tokio::select! {
        _ = Box::pin(monitor.run(shutdown_signal())) => { info!("Monitor stopped, exiting."); }
        r = Box::pin(run_mqtt(eventloop, shadow, state.clone())) => { error!("run_mqtt() ended: {r:?}"); }
        _ = Box::pin(run_api_server(state.clone())) => { error!("run_api_server() ended."); }
    };

    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            info!("Program interrupted.");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Program interrupted."),
        _ = sigterm.recv() => info!("Terminated."),
    }
}

// EOF
