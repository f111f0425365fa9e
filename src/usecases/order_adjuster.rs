//! Order Price Adjuster - Reference-Index Repricing Loop
//!
//! Reacts to last-price ticks from the price cache. Every route whose
//! reference ticker moved is recomputed with its own strategy, written back
//! in place and handed to the price validator together with the security's
//! current quote.
//!
//! Faults are isolated per route: an invalid adjustment on one route is
//! logged and counted, and the remaining routes are still processed.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use crate::adapters::cache::RouteStatusCache;
use crate::domain::price::PriceTick;
use crate::domain::route::RouteStatus;
use crate::ports::store::PriceStore;
use crate::ports::telemetry::{AdjustmentOutcome, NoopTelemetry, Telemetry};
use crate::ports::validation::PriceValidator;

/// Per-tick tally of route outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustmentSummary {
  /// Routes repriced and validated.
  pub adjusted: usize,
  /// Routes whose computation was non-finite; target left unchanged.
  pub suppressed: usize,
  /// Routes seeing their first reference price; baseline recorded only.
  pub seeded: usize,
}

impl AdjustmentSummary {
  fn record(&mut self, outcome: AdjustmentOutcome) {
    match outcome {
      AdjustmentOutcome::Adjusted => self.adjusted += 1,
      AdjustmentOutcome::Suppressed => self.suppressed += 1,
      AdjustmentOutcome::Seeded => self.seeded += 1,
    }
  }

  pub fn total(&self) -> usize {
    self.adjusted + self.suppressed + self.seeded
  }
}

/// Applies reference moves to every dependent route.
pub struct OrderPriceAdjuster {
  prices: Arc<dyn PriceStore>,
  routes: Arc<RouteStatusCache>,
  validator: Arc<dyn PriceValidator>,
  telemetry: Arc<dyn Telemetry>,
}

impl OrderPriceAdjuster {
  pub fn new(
    prices: Arc<dyn PriceStore>,
    routes: Arc<RouteStatusCache>,
    validator: Arc<dyn PriceValidator>,
  ) -> Self {
    Self {
      prices,
      routes,
      validator,
      telemetry: Arc::new(NoopTelemetry),
    }
  }

  pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
    self.telemetry = telemetry;
    self
  }

  /// Reprice every route that references `reference_ticker`.
  pub fn on_reference_tick(&self, reference_ticker: &str, live: f64) -> AdjustmentSummary {
    let mut summary = AdjustmentSummary::default();

    for route_id in self.routes.routes_for_reference(reference_ticker) {
      // The route may have closed since it was listed.
      let Some(outcome) = self
        .routes
        .update(&route_id, |route| self.adjust_route(route, live))
      else {
        continue;
      };
      self.telemetry.record_adjustment(outcome);
      summary.record(outcome);
    }

    if summary.total() > 0 {
      debug!(
        reference = reference_ticker,
        live,
        adjusted = summary.adjusted,
        suppressed = summary.suppressed,
        seeded = summary.seeded,
        "Reference tick processed"
      );
    }
    summary
  }

  fn adjust_route(&self, route: &mut RouteStatus, live: f64) -> AdjustmentOutcome {
    if !live.is_finite() || live <= 0.0 {
      warn!(
        route_id = %route.route_id,
        reference = %route.reference_ticker,
        live,
        "Unusable reference price, route left untouched"
      );
      return AdjustmentOutcome::Suppressed;
    }

    if route.last_ref_price.is_none() {
      route.last_ref_price = Some(live);
      route.live_ref_price = Some(live);
      route.updated_at = Utc::now();
      debug!(route_id = %route.route_id, live, "Reference baseline seeded");
      return AdjustmentOutcome::Seeded;
    }

    match route.strategy.compute(route, live) {
      Ok(adjustment) => {
        adjustment.apply_to(route);
        match self.prices.get(&route.ticker) {
          Some(security) => self.validator.validate(route, &security),
          None => warn!(
            route_id = %route.route_id,
            ticker = %route.ticker,
            "Security price unavailable, validation skipped"
          ),
        }
        AdjustmentOutcome::Adjusted
      }
      Err(e) => {
        // Rebase so the next tick computes against a usable reference.
        route.last_ref_price = Some(live);
        route.live_ref_price = Some(live);
        route.updated_at = Utc::now();
        warn!(
          route_id = %route.route_id,
          reference = %route.reference_ticker,
          error = %e,
          "Adjustment suppressed, target unchanged"
        );
        AdjustmentOutcome::Suppressed
      }
    }
  }

  /// Drive adjustments from price-cache ticks until shutdown or until the
  /// tick channel closes.
  #[instrument(skip_all, name = "order_adjuster")]
  pub async fn run(
    &self,
    mut ticks: broadcast::Receiver<PriceTick>,
    mut shutdown: broadcast::Receiver<()>,
  ) {
    info!(routes = self.routes.len(), "Starting order price adjuster");

    loop {
      tokio::select! {
        biased;
        _ = shutdown.recv() => {
          info!("Shutdown signal received, stopping adjuster");
          return;
        }
        tick = ticks.recv() => match tick {
          Ok(tick) => {
            self.on_reference_tick(&tick.ticker, tick.last_price);
          }
          Err(RecvError::Lagged(skipped)) => {
            warn!(skipped, "Adjuster lagging behind price ticks");
          }
          Err(RecvError::Closed) => {
            info!("Price tick channel closed, stopping adjuster");
            return;
          }
        }
      }
    }
  }
}
