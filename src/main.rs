use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use psystrike::config::{load_config, ProxyConfig};
use psystrike::lifecycle::{wait_for_signal, Shutdown};
use psystrike::observability::{logging, metrics, BuildInfo};
use psystrike::HttpServer;

/// Reverse proxy between Prometheus and a Kubernetes cluster.
#[derive(Parser, Debug)]
#[command(name = "psystrike", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability);

    let build = BuildInfo::current();
    tracing::info!(
        version = build.version.as_deref().unwrap_or("unknown"),
        config = ?cli.config,
        "psystrike starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        api_server = %config.kubernetes.api_server,
        api_server_port = config.kubernetes.api_server_port,
        request_timeout_secs = config.timeouts.request_secs,
        watch_buffer_secs = config.timeouts.watch_buffer_secs,
        "Configuration loaded"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        Some(metrics::init_metrics()?)
    } else {
        None
    };
    build.export();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let grace = Duration::from_secs(config.timeouts.shutdown_grace_secs);
    let shutdown = Shutdown::new();

    let mut server = HttpServer::new(config);
    if let Some(handle) = metrics_handle {
        server = server.with_metrics_handle(handle);
    }
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        signal = wait_for_signal() => {
            tracing::info!(signal, "Shutdown signal received");
            shutdown.trigger();
            match Shutdown::drain(server_task, grace).await {
                Some(Ok(result)) => result?,
                Some(Err(e)) => tracing::error!(error = %e, "HTTP server task failed"),
                None => tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, forcing exit"),
            }
        }
        result = &mut server_task => {
            tracing::error!("HTTP server exited before a shutdown signal");
            result??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
