//! Prometheus Metrics Registry - Ingestion and Repricing Observability
//!
//! Registers and exposes Prometheus metrics on :9090. Covers per-feed
//! message outcomes and consumption status, cache sizes, route adjustment
//! outcomes and the market session gauge.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::ports::telemetry::{AdjustmentOutcome, MessageOutcome, Telemetry};

/// Centralized Prometheus metrics for the service.
///
/// All metrics follow the naming convention `price_hub_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Messages by feed and outcome.
    pub feed_messages: IntCounterVec,
    /// Feed consumption status (1 = consuming, 0 = not).
    pub feed_consuming: IntGaugeVec,
    /// Entries per cache.
    pub cache_entries: IntGaugeVec,
    /// Route adjustments by outcome.
    pub adjustments: IntCounterVec,
    /// Market session status (1 = open).
    pub market_open: IntGauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let feed_messages = IntCounterVec::new(
            Opts::new("price_hub_feed_messages_total", "Messages received per feed by outcome"),
            &["feed", "outcome"],
        )?;

        let feed_consuming = IntGaugeVec::new(
            Opts::new(
                "price_hub_feed_consuming",
                "Feed consumption status (1=consuming, 0=not consuming)",
            ),
            &["feed"],
        )?;

        let cache_entries = IntGaugeVec::new(
            Opts::new("price_hub_cache_entries", "Records held per cache"),
            &["cache"],
        )?;

        let adjustments = IntCounterVec::new(
            Opts::new(
                "price_hub_route_adjustments_total",
                "Reference-driven route adjustments by outcome",
            ),
            &["outcome"],
        )?;

        let market_open = IntGauge::new(
            "price_hub_market_open",
            "Whether the market session is open (1=yes, 0=no)",
        )?;

        registry.register(Box::new(feed_messages.clone()))?;
        registry.register(Box::new(feed_consuming.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(adjustments.clone()))?;
        registry.register(Box::new(market_open.clone()))?;

        Ok(Self {
            registry,
            feed_messages,
            feed_consuming,
            cache_entries,
            adjustments,
            market_open,
        })
    }

    /// Record the current size of a cache.
    pub fn set_cache_entries(&self, cache: &str, entries: usize) {
        self.cache_entries
            .with_label_values(&[cache])
            .set(entries as i64);
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Metrics encoding failed");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

impl Telemetry for MetricsRegistry {
    fn record_message(&self, feed: &str, outcome: MessageOutcome) {
        self.feed_messages
            .with_label_values(&[feed, outcome.as_str()])
            .inc();
    }

    fn set_feed_consuming(&self, feed: &str, consuming: bool) {
        self.feed_consuming
            .with_label_values(&[feed])
            .set(i64::from(consuming));
    }

    fn record_adjustment(&self, outcome: AdjustmentOutcome) {
        self.adjustments.with_label_values(&[outcome.as_str()]).inc();
    }

    fn set_market_open(&self, open: bool) {
        self.market_open.set(i64::from(open));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_show_up_in_exposition() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_message("equity", MessageOutcome::Applied);
        metrics.record_message("equity", MessageOutcome::Rejected);
        metrics.set_feed_consuming("equity", true);
        metrics.record_adjustment(AdjustmentOutcome::Suppressed);
        metrics.set_market_open(true);
        metrics.set_cache_entries("prices", 42);

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"price_hub_feed_messages_total{feed="equity",outcome="rejected"} 1"#));
        assert!(text.contains(r#"price_hub_feed_consuming{feed="equity"} 1"#));
        assert!(text.contains(r#"price_hub_route_adjustments_total{outcome="suppressed"} 1"#));
        assert!(text.contains("price_hub_market_open 1"));
        assert!(text.contains(r#"price_hub_cache_entries{cache="prices"} 42"#));
    }
}
