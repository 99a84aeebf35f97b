//! Qenus Router - Main entry point
//!
//! Loads the provider catalog, then either answers a one-off query
//! (`--status`, `--select`) or runs the maintenance loop until shutdown.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Arg, Command};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qenus_router::{EndpointRouter, RouterConfig, Tier, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Command::new("qenus-router")
        .version(VERSION)
        .about("Qenus Router - multi-provider, rate-limited endpoint router")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/router.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .arg(
            Arg::new("metrics-addr")
                .long("metrics-addr")
                .value_name("ADDR")
                .help("Expose Prometheus metrics on this address (e.g. 127.0.0.1:9100)"),
        )
        .arg(
            Arg::new("status")
                .long("status")
                .help("Print the router status as JSON and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("select")
                .long("select")
                .value_name("NETWORK")
                .help("Select an endpoint for NETWORK, print it as JSON and exit"),
        )
        .arg(
            Arg::new("tier")
                .long("tier")
                .value_name("TIER")
                .help("Preferred tier for --select (premium, fallback)")
                .default_value("premium"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .value_name("COUNT")
                .help("With --select, return up to COUNT endpoints from distinct providers")
                .value_parser(clap::value_parser!(usize)),
        )
        .get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    init_logging(log_level);

    info!(version = VERSION, "Starting Qenus Router");

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/router.toml");
    let config = load_config(config_path)?;

    if let Some(addr) = matches.get_one::<String>("metrics-addr") {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid metrics address: {}", addr))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    let router = Arc::new(EndpointRouter::new(&config)?);

    if matches.get_flag("status") {
        println!("{}", router.status().to_json()?);
        return Ok(());
    }

    if let Some(network) = matches.get_one::<String>("select") {
        let json = match matches.get_one::<usize>("parallel") {
            Some(&count) => serde_json::to_string_pretty(&router.select_parallel_endpoints(network, count))?,
            None => {
                let tier: Tier = matches
                    .get_one::<String>("tier")
                    .map(String::as_str)
                    .unwrap_or("premium")
                    .parse()?;
                serde_json::to_string_pretty(&router.select_endpoint(network, tier)?)?
            }
        };
        println!("{}", json);
        return Ok(());
    }

    run(router, Duration::from_secs(config.global.status_log_interval_seconds.max(1))).await;

    info!("Qenus Router stopped");
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("qenus_router={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load configuration from `path` if it exists, otherwise from the layered defaults
fn load_config(path: &str) -> anyhow::Result<RouterConfig> {
    let config = if Path::new(path).exists() {
        info!(config_path = path, "Loading configuration");
        RouterConfig::from_file(path)?
    } else {
        warn!(config_path = path, "Configuration file not found, using layered defaults");
        RouterConfig::load()?
    };

    config.validate()?;
    Ok(config)
}

/// Run maintenance and periodic status logging until a shutdown signal arrives
async fn run(router: Arc<EndpointRouter>, status_interval: Duration) {
    let maintenance = router.start_maintenance();
    let mut events = router.subscribe();
    let mut ticker = tokio::time::interval(status_interval);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping router...");
                break;
            }
            Ok(event) = events.recv() => {
                info!(provider = event.provider_id(), ?event, "Router event");
            }
            _ = ticker.tick() => {
                let status = router.status();
                status.record_metrics();
                info!(
                    used_capacity = status.used_capacity,
                    total_capacity = status.total_capacity,
                    utilization_percent = status.utilization_percent,
                    blacklisted = status.blacklisted_providers,
                    "Router status"
                );
            }
        }
    }

    maintenance.stop().await;
}

/// Set up graceful shutdown signal handling
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
