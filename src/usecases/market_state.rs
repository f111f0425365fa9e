//! Market State Controller - Session Gate for Real-Time Dispatch
//!
//! Closed (initial) <-> Open. Every transition goes through a single-permit
//! semaphore, so concurrent callers queue up rather than interleave. While
//! Open, an optional periodic tick calls the session hooks and broadcasts
//! `MarketEvent::Tick`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::domain::market::{MarketEvent, MarketState};
use crate::ports::session::SessionHooks;
use crate::ports::telemetry::{NoopTelemetry, Telemetry};

/// Market control failures.
#[derive(Debug, Error)]
pub enum MarketStateError {
  #[error("illegal market transition: cannot {action} while {from}")]
  IllegalTransition {
    from: MarketState,
    action: &'static str,
  },
  /// The controller has been shut down.
  #[error("market state controller is shut down")]
  GateClosed,
  #[error("failed to reload session defaults: {0}")]
  Reload(String),
}

/// Owns the market session state and its periodic tick.
pub struct MarketStateController {
  /// Serializes transitions.
  gate: Semaphore,
  state_tx: watch::Sender<MarketState>,
  events_tx: broadcast::Sender<MarketEvent>,
  hooks: Arc<dyn SessionHooks>,
  /// Tick period while Open. `None` = no tick.
  tick_interval: Option<Duration>,
  /// Running tick task, only touched while holding the gate.
  ticker: Mutex<Option<JoinHandle<()>>>,
  telemetry: Arc<dyn Telemetry>,
}

impl MarketStateController {
  pub fn new(hooks: Arc<dyn SessionHooks>, tick_interval: Option<Duration>) -> Self {
    let (state_tx, _) = watch::channel(MarketState::Closed);
    let (events_tx, _) = broadcast::channel(256);
    Self {
      gate: Semaphore::new(1),
      state_tx,
      events_tx,
      hooks,
      tick_interval,
      ticker: Mutex::new(None),
      telemetry: Arc::new(NoopTelemetry),
    }
  }

  pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
    self.telemetry = telemetry;
    self
  }

  pub fn state(&self) -> MarketState {
    *self.state_tx.borrow()
  }

  /// Current state, updated on every transition.
  pub fn watch_state(&self) -> watch::Receiver<MarketState> {
    self.state_tx.subscribe()
  }

  /// Market events: opened, closed, reset and ticks.
  pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
    self.events_tx.subscribe()
  }

  /// Closed -> Open. No-op if already Open.
  #[instrument(skip(self))]
  pub async fn open_market(&self) -> Result<(), MarketStateError> {
    let _permit = self.gate.acquire().await.map_err(|_| MarketStateError::GateClosed)?;

    if self.state() == MarketState::Open {
      debug!("Market already open");
      return Ok(());
    }

    self.state_tx.send_replace(MarketState::Open);
    if let Some(interval) = self.tick_interval {
      let handle = self.spawn_ticker(interval);
      if let Some(stale) = self.swap_ticker(Some(handle)) {
        stale.abort();
      }
    }
    self.telemetry.set_market_open(true);
    let _ = self.events_tx.send(MarketEvent::Opened);
    info!("Market opened");
    Ok(())
  }

  /// Open -> Closed. No-op, without a broadcast, if already Closed.
  #[instrument(skip(self))]
  pub async fn close_market(&self) -> Result<(), MarketStateError> {
    let _permit = self.gate.acquire().await.map_err(|_| MarketStateError::GateClosed)?;
    self.close_locked();
    Ok(())
  }

  /// Reload default session state. Only legal while Closed.
  #[instrument(skip(self))]
  pub async fn reset(&self) -> Result<(), MarketStateError> {
    let _permit = self.gate.acquire().await.map_err(|_| MarketStateError::GateClosed)?;

    let current = self.state();
    if current == MarketState::Open {
      warn!("Reset rejected while market is open");
      return Err(MarketStateError::IllegalTransition {
        from: current,
        action: "reset",
      });
    }

    self
      .hooks
      .reload_defaults()
      .await
      .map_err(|e| MarketStateError::Reload(format!("{e:#}")))?;

    let _ = self.events_tx.send(MarketEvent::Reset);
    info!("Market session reset");
    Ok(())
  }

  /// Close the market if open and refuse every later transition.
  pub async fn shutdown(&self) {
    if let Ok(_permit) = self.gate.acquire().await {
      self.close_locked();
    }
    self.gate.close();
  }

  /// Caller holds the gate.
  fn close_locked(&self) {
    if self.state() == MarketState::Closed {
      debug!("Market already closed");
      return;
    }

    self.state_tx.send_replace(MarketState::Closed);
    if let Some(ticker) = self.swap_ticker(None) {
      ticker.abort();
    }
    self.telemetry.set_market_open(false);
    let _ = self.events_tx.send(MarketEvent::Closed);
    info!("Market closed");
  }

  fn swap_ticker(&self, next: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
    let mut slot = match self.ticker.lock() {
      Ok(slot) => slot,
      Err(poisoned) => poisoned.into_inner(),
    };
    std::mem::replace(&mut *slot, next)
  }

  fn spawn_ticker(&self, interval: Duration) -> JoinHandle<()> {
    let hooks = Arc::clone(&self.hooks);
    let events = self.events_tx.clone();

    tokio::spawn(async move {
      let mut timer = tokio::time::interval(interval);
      timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
      // The first tick completes immediately.
      timer.tick().await;

      let mut seq: u64 = 0;
      loop {
        timer.tick().await;
        seq += 1;
        hooks.on_tick(seq).await;
        let _ = events.send(MarketEvent::Tick(seq));
      }
    })
  }
}

impl Drop for MarketStateController {
  fn drop(&mut self) {
    if let Some(ticker) = self.swap_ticker(None) {
      ticker.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ports::session::NoopSessionHooks;

  fn controller(tick: Option<Duration>) -> MarketStateController {
    MarketStateController::new(Arc::new(NoopSessionHooks), tick)
  }

  #[tokio::test]
  async fn test_open_then_close_broadcasts() {
    let market = controller(None);
    let mut events = market.subscribe();

    market.open_market().await.unwrap();
    market.open_market().await.unwrap();
    market.close_market().await.unwrap();

    assert_eq!(events.recv().await.unwrap(), MarketEvent::Opened);
    assert_eq!(events.recv().await.unwrap(), MarketEvent::Closed);
    assert!(events.try_recv().is_err());
    assert_eq!(market.state(), MarketState::Closed);
  }

  #[tokio::test]
  async fn test_close_while_closed_is_silent() {
    let market = controller(None);
    let mut events = market.subscribe();

    market.close_market().await.unwrap();
    assert!(events.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_reset_rules() {
    let market = controller(None);
    let mut events = market.subscribe();

    market.reset().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), MarketEvent::Reset);

    market.open_market().await.unwrap();
    let err = market.reset().await.unwrap_err();
    assert!(matches!(
      err,
      MarketStateError::IllegalTransition {
        from: MarketState::Open,
        ..
      }
    ));
  }

  #[tokio::test]
  async fn test_ticks_only_while_open() {
    let market = controller(Some(Duration::from_millis(10)));
    let mut events = market.subscribe();

    market.open_market().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), MarketEvent::Opened);
    assert_eq!(events.recv().await.unwrap(), MarketEvent::Tick(1));

    market.close_market().await.unwrap();
    loop {
      if events.recv().await.unwrap() == MarketEvent::Closed {
        break;
      }
    }
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(events.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_shutdown_closes_gate() {
    let market = controller(None);
    market.open_market().await.unwrap();
    market.shutdown().await;

    assert_eq!(market.state(), MarketState::Closed);
    assert!(matches!(market.open_market().await, Err(MarketStateError::GateClosed)));
  }
}
