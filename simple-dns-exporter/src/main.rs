//! Prometheus DNS probe exporter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dns_probe::Prober;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use simple_dns_exporter::config::parse_duration;
use simple_dns_exporter::{ExporterConfig, HttpServer, init_tracing};

/// Prometheus exporter probing DNS servers on demand.
#[derive(Parser, Debug)]
#[command(name = "simple-dns-exporter")]
#[command(about = "Probe DNS servers and export Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config and BIND_ADDR).
    #[arg(long)]
    listen: Option<String>,

    /// Per-probe timeout, e.g. "5s" or "750ms" (overrides config and QUERY_TIMEOUT).
    #[arg(long)]
    query_timeout: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };
    config.apply_env()?;

    // Command line wins over file and environment
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(timeout) = &args.query_timeout {
        config.server.query_timeout = parse_duration(timeout)
            .map_err(|e| anyhow::anyhow!("Invalid --query-timeout: {}", e))?;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    init_tracing(&config.logging)?;

    info!("Starting simple DNS exporter");

    let listen_addr: SocketAddr = config
        .server
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let shutdown = CancellationToken::new();
    let http_server = HttpServer::new(
        Arc::new(Prober::default()),
        listen_addr,
        config.server.query_timeout,
        config.server.probe_path.clone(),
    );

    let http_shutdown = shutdown.clone();
    let mut http_task = tokio::spawn(async move { http_server.run(http_shutdown).await });

    // Wait for a shutdown signal, or for the server to stop on its own
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
        result = &mut http_task => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!("HTTP server error: {}", e);
                    Err(e)
                }
                Err(e) => Err(e.into()),
            };
        }
    }

    // Signal shutdown; in-flight probes are cancelled and report a timeout
    shutdown.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
