// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use remote_write_forwarder::{
    config::Config, forwarder::ForwarderService, server::RemoteWriteServer, sink::build_sink,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = Config::from_env();

    let log_level = config
        .as_ref()
        .map(|config| config.log_level.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());
    if let Err(e) = init_logging(&log_level) {
        eprintln!("Failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!("Configuration loaded: {config:?}");

    let listener = match TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Unable to listen on {}: {e}", config.listen_addr);
            return ExitCode::FAILURE;
        }
    };

    let sink = build_sink(config.sink, &config.aws_region).await;
    let (service, handle) = ForwarderService::new(config.forwarder_config(), sink);
    let forwarder = tokio::spawn(service.run());

    let shutdown = CancellationToken::new();
    let server = RemoteWriteServer::new(handle.clone(), config.max_request_content_length);
    let server = tokio::spawn(server.serve(listener, shutdown.clone()));

    info!(
        "Forwarding remote write requests on {} to {} {} ({} encoding)",
        config.listen_addr, config.sink, config.stream_name, config.encoding
    );

    wait_for_shutdown_signal().await;

    let drain = async {
        shutdown.cancel();
        match server.await {
            Ok(Ok(())) => debug!("Server stopped"),
            Ok(Err(e)) => error!("Server error: {e}"),
            Err(e) => error!("Server task failed: {e}"),
        }

        if let Err(e) = handle.close() {
            error!("Error closing forwarder: {e}");
        }
        forwarder.await
    };

    match timeout(config.shutdown_timeout, drain).await {
        Ok(Ok(summary)) => {
            info!(
                "Shut down after sending {} records in {} batches ({} batches failed)",
                summary.records_sent, summary.batches_sent, summary.batches_failed
            );
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("Forwarder task failed: {e}");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!(
                "Forwarder did not drain within {:?}, exiting",
                config.shutdown_timeout
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,aws_smithy_runtime=warn,aws_config=warn,{log_level}"
    );

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_new(env_filter)?)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    debug!("Logging subsystem enabled");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to set up signal handlers, falling back to ctrl-c: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {e}");
        return;
    }
    info!("Received ctrl-c, shutting down...");
}
