//! Feed Port - Per-Feed Message Handling
//!
//! A `FeedHandler` turns one raw message body into cache writes. The
//! ingestion pipeline owns the queue lifecycle and acknowledgment; the
//! handler only decodes and applies.

use thiserror::Error;

use super::queue::QueueError;

/// Failures surfaced by a feed pipeline.
#[derive(Debug, Error)]
pub enum FeedError {
  /// The connection retry budget was exhausted. Recoverable: the pipeline
  /// stays disconnected and a later `connect` starts a fresh budget.
  #[error("feed {feed}: connection failed after {attempts} attempts: {last_error}")]
  ConnectionFailure {
    feed: String,
    attempts: u32,
    last_error: String,
  },
  /// A message could not be decoded or applied; it was not acknowledged.
  #[error("feed {feed}: message processing failed: {reason}")]
  MessageProcessing { feed: String, reason: String },
  /// `consume` was called without an open session.
  #[error("feed {0}: not connected")]
  NotConnected(String),
  /// The pipeline has been stopped.
  #[error("feed {0}: stopped")]
  Stopped(String),
  /// Broker failure outside connection setup.
  #[error("feed {feed}: {source}")]
  Queue {
    feed: String,
    #[source]
    source: QueueError,
  },
}

/// Decodes a feed's payload and writes it into the caches.
pub trait FeedHandler: Send + Sync + 'static {
  /// Feed name used in logs and metrics.
  fn name(&self) -> &str;

  /// Decode and apply one message body, returning the number of records
  /// written. An error leaves the message unacknowledged.
  fn apply(&self, payload: &[u8]) -> Result<usize, FeedError>;
}
