//! Feed Ingestion Pipeline - Queue Lifecycle per External Feed
//!
//! One pipeline per feed. It opens a broker session with a bounded retry
//! budget, attaches a consumer with the feed's prefetch window, hands each
//! delivery to the feed's handler and acknowledges only what was applied.
//!
//! States: Disconnected -> Connecting -> Connected -> Consuming, with
//! Stopped terminal from anywhere. The current state is published on a
//! `watch` channel for health reporting.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::ports::feed::{FeedError, FeedHandler};
use crate::ports::queue::{Delivery, QueueBinding, QueueError, QueueSession, QueueTransport};
use crate::ports::telemetry::{MessageOutcome, NoopTelemetry, Telemetry};

use super::retry::RetryPolicy;

/// Connection lifecycle of a feed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Disconnected,
  Connecting,
  Connected,
  Consuming,
  Stopped,
}

impl std::fmt::Display for PipelineState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Disconnected => "disconnected",
      Self::Connecting => "connecting",
      Self::Connected => "connected",
      Self::Consuming => "consuming",
      Self::Stopped => "stopped",
    };
    f.write_str(s)
  }
}

/// Queue consumer for a single feed.
pub struct FeedPipeline {
  /// Payload decoder and cache writer.
  handler: Arc<dyn FeedHandler>,
  /// Broker access.
  transport: Arc<dyn QueueTransport>,
  /// Queue and prefetch window.
  binding: QueueBinding,
  /// Budget for each `connect` call.
  retry: RetryPolicy,
  /// Wait before recovering a dropped session. `None` disables recovery.
  recovery_interval: Option<Duration>,
  /// Open session, if any.
  session: Mutex<Option<Box<dyn QueueSession>>>,
  /// Published lifecycle state.
  state_tx: watch::Sender<PipelineState>,
  telemetry: Arc<dyn Telemetry>,
}

impl FeedPipeline {
  pub fn new(
    handler: Arc<dyn FeedHandler>,
    transport: Arc<dyn QueueTransport>,
    binding: QueueBinding,
  ) -> Self {
    let (state_tx, _) = watch::channel(PipelineState::Disconnected);
    Self {
      handler,
      transport,
      binding,
      retry: RetryPolicy::default(),
      recovery_interval: None,
      session: Mutex::new(None),
      state_tx,
      telemetry: Arc::new(NoopTelemetry),
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Recover dropped sessions after a fixed wait.
  pub fn with_recovery(mut self, interval: Duration) -> Self {
    self.recovery_interval = Some(interval);
    self
  }

  pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
    self.telemetry = telemetry;
    self
  }

  /// Feed name.
  pub fn name(&self) -> &str {
    self.handler.name()
  }

  pub fn binding(&self) -> &QueueBinding {
    &self.binding
  }

  pub fn state(&self) -> PipelineState {
    *self.state_tx.borrow()
  }

  /// Observe state changes.
  pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
    self.state_tx.subscribe()
  }

  /// Open a session, spending at most one retry budget.
  ///
  /// On exhaustion the pipeline is left Disconnected and the failure is
  /// returned; calling `connect` again starts a fresh budget.
  pub async fn connect(&self) -> Result<(), FeedError> {
    if self.state() == PipelineState::Stopped {
      return Err(FeedError::Stopped(self.name().to_string()));
    }

    self.close_session().await;
    self.set_state(PipelineState::Connecting);

    let transport = Arc::clone(&self.transport);
    let feed = self.name().to_string();
    let result = self
      .retry
      .run(self.name(), move |attempt| {
        let transport = Arc::clone(&transport);
        let feed = feed.clone();
        async move {
          debug!(feed = %feed, attempt, "Opening queue connection");
          transport.connect(&feed).await
        }
      })
      .await;

    match result {
      Ok(session) => {
        if self.state() == PipelineState::Stopped {
          if let Err(e) = session.close().await {
            debug!(feed = %self.name(), error = %e, "Close after stop failed");
          }
          return Err(FeedError::Stopped(self.name().to_string()));
        }
        *self.session.lock().await = Some(session);
        self.set_state(PipelineState::Connected);
        info!(feed = %self.name(), queue = %self.binding.queue, "Queue connection established");
        Ok(())
      }
      Err(exhausted) => {
        self.set_state(PipelineState::Disconnected);
        error!(
          feed = %self.name(),
          attempts = exhausted.attempts,
          error = %exhausted.last_error,
          "Queue connection failed, retry budget exhausted"
        );
        Err(FeedError::ConnectionFailure {
          feed: self.name().to_string(),
          attempts: exhausted.attempts,
          last_error: exhausted.last_error.to_string(),
        })
      }
    }
  }

  /// Attach the consumer and process deliveries until shutdown.
  ///
  /// Returns `Ok` on shutdown. Returns an error when there is no session,
  /// consumer setup fails, or the delivery stream errors or ends; the
  /// pipeline is then Disconnected (or Stopped if `stop` caused it).
  pub async fn consume(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<(), FeedError> {
    let mut deliveries = {
      let guard = self.session.lock().await;
      let session = guard
        .as_ref()
        .ok_or_else(|| FeedError::NotConnected(self.name().to_string()))?;
      session
        .consume(&self.binding)
        .await
        .map_err(|source| self.queue_error(source))?
    };

    self.set_state(PipelineState::Consuming);
    info!(
      feed = %self.name(),
      queue = %self.binding.queue,
      prefetch = self.binding.prefetch,
      "Consuming"
    );

    let interruption = loop {
      tokio::select! {
        biased;
        _ = shutdown.recv() => {
          info!(feed = %self.name(), "Shutdown signal received in feed pipeline");
          return Ok(());
        }
        next = deliveries.next() => match next {
          Some(Ok(delivery)) => {
            if let Err(e) = self.handle_delivery(&delivery).await {
              debug!(feed = %self.name(), delivery_tag = delivery.tag, error = %e, "Delivery not applied, continuing");
            }
          }
          Some(Err(e)) => break e,
          None => break QueueError::Delivery("delivery stream ended".to_string()),
        }
      }
    };

    drop(deliveries);
    self.close_session().await;
    self.set_state(PipelineState::Disconnected);
    Err(self.queue_error(interruption))
  }

  /// Apply one delivery and acknowledge it.
  ///
  /// A decode/apply failure leaves the message unacknowledged and is
  /// returned as `MessageProcessing`.
  pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<usize, FeedError> {
    let applied = match self.handler.apply(&delivery.payload) {
      Ok(applied) => applied,
      Err(e) => {
        self.telemetry.record_message(self.name(), MessageOutcome::Rejected);
        warn!(
          feed = %self.name(),
          delivery_tag = delivery.tag,
          error = %e,
          "Message rejected, left unacknowledged"
        );
        return Err(e);
      }
    };

    if let Err(source) = delivery.ack().await {
      self.telemetry.record_message(self.name(), MessageOutcome::AckFailed);
      warn!(feed = %self.name(), delivery_tag = delivery.tag, error = %source, "Acknowledgment failed");
      return Err(self.queue_error(source));
    }

    self.telemetry.record_message(self.name(), MessageOutcome::Applied);
    trace!(feed = %self.name(), delivery_tag = delivery.tag, records = applied, "Message applied");
    Ok(applied)
  }

  /// Connect, consume, and recover from dropped sessions until shutdown.
  ///
  /// Each recovery waits the recovery interval and then spends one fresh
  /// connect budget. If that budget runs out the pipeline stays
  /// Disconnected and the failure is returned.
  #[instrument(skip(self, shutdown), fields(feed = %self.name()))]
  pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), FeedError> {
    self.connect().await?;

    loop {
      let interruption = match self.consume(&mut shutdown).await {
        Ok(()) => {
          self.stop().await;
          return Ok(());
        }
        Err(e) => e,
      };

      if self.state() == PipelineState::Stopped {
        return Ok(());
      }

      let Some(interval) = self.recovery_interval else {
        error!(error = %interruption, "Consumption interrupted, recovery disabled");
        return Err(interruption);
      };

      warn!(
        error = %interruption,
        wait_ms = interval.as_millis() as u64,
        "Consumption interrupted, recovering"
      );

      tokio::select! {
        _ = shutdown.recv() => {
          self.stop().await;
          return Ok(());
        }
        _ = tokio::time::sleep(interval) => {}
      }

      self.connect().await?;
    }
  }

  /// Close the channel and connection. Idempotent.
  pub async fn stop(&self) {
    let previous = self.state_tx.send_replace(PipelineState::Stopped);
    self.close_session().await;
    if previous != PipelineState::Stopped {
      self.telemetry.set_feed_consuming(self.name(), false);
      info!(feed = %self.name(), "Feed pipeline stopped");
    }
  }

  async fn close_session(&self) {
    let session = self.session.lock().await.take();
    if let Some(session) = session {
      if let Err(e) = session.close().await {
        warn!(feed = %self.name(), error = %e, "Queue close failed");
      }
    }
  }

  /// Move to `next` unless already Stopped.
  fn set_state(&self, next: PipelineState) {
    let changed = self.state_tx.send_if_modified(|current| {
      if *current == PipelineState::Stopped || *current == next {
        return false;
      }
      *current = next;
      true
    });
    if changed {
      self
        .telemetry
        .set_feed_consuming(self.name(), next == PipelineState::Consuming);
      debug!(feed = %self.name(), state = %next, "Pipeline state changed");
    }
  }

  fn queue_error(&self, source: QueueError) -> FeedError {
    FeedError::Queue {
      feed: self.name().to_string(),
      source,
    }
  }
}
