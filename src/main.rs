//! Price Hub - Entry Point
//!
//! Loads configuration, wires the caches, feed pipelines, order-price
//! adjuster and market controller, and runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Build shared caches and the data-ready flag
//! 4. Create metrics registry (Telemetry port)
//! 5. Create market state controller
//! 6. Spawn feed pipelines over AMQP
//! 7. Spawn order price adjuster on cache ticks
//! 8. Spawn dispatch monitor, health and metrics servers
//! 9. Wait for SIGINT -> graceful shutdown (signal -> stop feeds -> close market -> join)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use price_hub::adapters::cache::{OrderErrorBook, PriceCache, RouteStatusCache};
use price_hub::adapters::feeds::{FeedSupervisor, FeedTargets};
use price_hub::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use price_hub::adapters::queue::AmqpTransport;
use price_hub::adapters::validation::PassThroughValidator;
use price_hub::config;
use price_hub::domain::market::DataReadyFlag;
use price_hub::ports::session::NoopSessionHooks;
use price_hub::ports::telemetry::{NoopTelemetry, Telemetry};
use price_hub::usecases::{Dispatcher, MarketStateController, OrderPriceAdjuster, RouteFilter};

/// Capacity of the price-tick broadcast feeding the adjuster.
const TICK_CHANNEL_CAPACITY: usize = 4096;

/// How often cache sizes are sampled into metrics.
const CACHE_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on waiting for tasks after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.service.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        feeds = config.feeds.len(),
        "Starting price hub"
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 3. Shared caches ────────────────────────────────────
    let prices = Arc::new(PriceCache::with_notifications(TICK_CHANNEL_CAPACITY));
    let routes = Arc::new(RouteStatusCache::new());
    let order_errors = Arc::new(OrderErrorBook::new());
    let data_ready = Arc::new(DataReadyFlag::default());

    // ── 4. Metrics ──────────────────────────────────────────
    let metrics = if config.metrics.enabled {
        Some(Arc::new(MetricsRegistry::new().context("Failed to build metrics registry")?))
    } else {
        None
    };
    let telemetry: Arc<dyn Telemetry> = match &metrics {
        Some(metrics) => Arc::clone(metrics) as Arc<dyn Telemetry>,
        None => Arc::new(NoopTelemetry),
    };

    // ── 5. Market state controller ──────────────────────────
    let market = Arc::new(
        MarketStateController::new(Arc::new(NoopSessionHooks), config.market.tick_interval())
            .with_telemetry(Arc::clone(&telemetry)),
    );
    if config.market.open_on_start {
        market.open_market().await.context("Failed to open market")?;
    }

    // ── 6. Feed pipelines ───────────────────────────────────
    let targets = FeedTargets {
        prices: prices.clone(),
        order_errors: Arc::clone(&order_errors),
        data_ready: Arc::clone(&data_ready),
    };
    let supervisor = Arc::new(
        FeedSupervisor::from_config(
            &config,
            Arc::new(AmqpTransport::new(&config.broker.uri)),
            &targets,
            Arc::clone(&telemetry),
            shutdown_tx.clone(),
        )
        .context("Failed to build feed pipelines")?,
    );
    let mut handles = supervisor.spawn();

    // ── 7. Order price adjuster ─────────────────────────────
    let adjuster = OrderPriceAdjuster::new(
        prices.clone(),
        Arc::clone(&routes),
        Arc::new(PassThroughValidator),
    )
    .with_telemetry(Arc::clone(&telemetry));
    let ticks = prices
        .subscribe()
        .context("Price cache built without tick notifications")?;
    let adjuster_shutdown = shutdown_tx.subscribe();
    handles.push(tokio::spawn(async move {
        adjuster.run(ticks, adjuster_shutdown).await;
    }));

    // ── 8. Dispatch monitor, health and metrics servers ─────
    let dispatcher = Dispatcher::new(Arc::clone(&data_ready), market.watch_state())
        .with_min_interval(Duration::from_millis(config.dispatch.min_interval_ms));
    let adjusted_routes = dispatcher.subscribe(
        Arc::clone(&routes),
        Duration::from_millis(config.dispatch.default_interval_ms),
        RouteFilter::Adjusted,
        shutdown_tx.subscribe(),
    );
    handles.push(tokio::spawn(async move {
        tokio::pin!(adjusted_routes);
        while let Some(route) = adjusted_routes.next().await {
            debug!(
                route_id = %route.route_id,
                target = ?route.target_price,
                order_price = ?route.order_price,
                "Route status"
            );
        }
    }));

    let health = HealthServer::new(
        HealthState::new(Arc::clone(&data_ready), Arc::clone(&supervisor)),
        config.metrics.health_port,
    );
    let health_shutdown = shutdown_tx.subscribe();
    handles.push(tokio::spawn(async move {
        if let Err(e) = health.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    }));

    if let Some(metrics) = metrics {
        let bind_address = config.metrics.bind_address.clone();
        let serve_shutdown = shutdown_tx.subscribe();
        let server = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            if let Err(e) = server.serve(bind_address, serve_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }));

        let (prices, routes, order_errors) =
            (prices.clone(), Arc::clone(&routes), Arc::clone(&order_errors));
        let mut sample_shutdown = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            let mut timer = tokio::time::interval(CACHE_SAMPLE_INTERVAL);
            loop {
                tokio::select! {
                    _ = sample_shutdown.recv() => break,
                    _ = timer.tick() => {
                        metrics.set_cache_entries("prices", prices.len());
                        metrics.set_cache_entries("routes", routes.len());
                        metrics.set_cache_entries("order_errors", order_errors.len());
                    }
                }
            }
        }));
    }

    info!("All tasks spawned, price hub is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT, shutting down");
    }
    info!("SIGINT received, initiating graceful shutdown");

    let _ = shutdown_tx.send(());
    supervisor.stop_all().await;
    market.shutdown().await;

    let joined = tokio::time::timeout(SHUTDOWN_GRACE, futures_util::future::join_all(handles)).await;
    if joined.is_err() {
        warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Some tasks did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}
