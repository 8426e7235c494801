/**
 * TRACKER KERNEL - Entry point
 *
 * ROLE: wire config, serial source, polling driver, snapshot and the read-only
 * consumers (HTTP API, console table, health log) together, then wait for Ctrl-C.
 *
 * FATAL AT STARTUP: invalid configuration, serial port that cannot be opened.
 * Everything after that is absorbed by the polling loop.
 */

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracker_kernel::config::load_config;
use tracker_kernel::http::{self, AppState};
use tracker_kernel::serial::SerialSource;
use tracker_kernel::view::spawn_console_table;
use tracker_kernel::{FrameDecoder, HealthTracker, PollingDriver, StatusAggregator};

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tracker_kernel=info")),
        )
        .init();

    let cfg = load_config().await.context("invalid configuration")?;
    let source = SerialSource::open(&cfg.serial).context("serial stream unavailable")?;

    let aggregator = StatusAggregator::shared();
    let health_tracker = HealthTracker::new();
    let shutdown = CancellationToken::new();

    let driver = PollingDriver::new(source, aggregator.clone(), health_tracker.clone())
        .with_decoder(FrameDecoder::new().strict(cfg.decoder.strict_schema))
        .with_poll_interval(cfg.serial.poll_interval());
    let driver_task = tokio::spawn(driver.run(shutdown.clone()));

    let mut background = Vec::new();
    if cfg.health.log_interval_secs > 0 {
        background.push(health_tracker.spawn_health_reporter(
            aggregator.clone(),
            std::time::Duration::from_secs(cfg.health.log_interval_secs),
            shutdown.clone(),
        ));
    }
    if cfg.display.console_table {
        background.push(spawn_console_table(
            aggregator.clone(),
            cfg.serial.poll_interval(),
            shutdown.clone(),
        ));
    }

    let http_task = if cfg.http.enabled {
        let addr = cfg.http.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind http listener on {addr}"))?;
        info!("listening on http://{addr}");

        let app = http::build_router(AppState {
            aggregator: aggregator.clone(),
            health_tracker: health_tracker.clone(),
            api_key: cfg.http.api_key.clone(),
        });
        let stop = shutdown.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for shutdown signal")?;
    info!("shutdown requested");
    shutdown.cancel();

    driver_task.await.context("polling driver task failed")?;
    for task in background {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    if let Some(task) = http_task {
        task.await
            .context("http task failed")?
            .context("http server error")?;
    }

    info!("tracker kernel stopped");
    Ok(())
}
