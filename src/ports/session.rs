//! Session Hooks Port - Market Session Side Effects
//!
//! Invoked by the market-state controller: a periodic tick while the
//! market is open, and a reload of default state on reset.

use async_trait::async_trait;

#[async_trait]
pub trait SessionHooks: Send + Sync + 'static {
  /// Called on every periodic tick while the market is open.
  async fn on_tick(&self, seq: u64);

  /// Reload default session state. Called by `reset`.
  async fn reload_defaults(&self) -> anyhow::Result<()>;
}

/// Hooks that do nothing, for deployments without a timer-driven refresh.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionHooks;

#[async_trait]
impl SessionHooks for NoopSessionHooks {
  async fn on_tick(&self, _seq: u64) {}

  async fn reload_defaults(&self) -> anyhow::Result<()> {
    Ok(())
  }
}
