use anyhow::Result;
use forkwatch_core::{config::AppConfig, runtime::Monitor};
use std::net::SocketAddr;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod router;

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` takes precedence over the configured level; the configured
/// format selects between pretty and JSON output.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,forkwatch_core={level},server={level}",
            level = config.logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        // "pretty" and any other format default to pretty logging
        let fmt_layer = tracing_subscriber::fmt::layer().pretty().with_target(false);
        registry.with(fmt_layer).init();
    }
}

/// Completes when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => warn!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // tokio-tungstenite's rustls connector needs a process-wide crypto
    // provider; installing twice is harmless.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = AppConfig::load()
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    init_logging(&config);

    let monitor = Monitor::start(&config)
        .map_err(|e| anyhow::anyhow!("failed to start monitor: {e}"))?;

    let app = router::api_router(monitor.registry(), &config.server);
    let addr: SocketAddr =
        format!("{}:{}", config.server.bind_address, config.server.bind_port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "snapshot API listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("shutdown signal received");
    monitor.shutdown().await;
    Ok(())
}
