//! Queue Port - Message Broker Interface
//!
//! Defines what the ingestion pipeline needs from a broker: open a session,
//! attach a consumer to a named queue with a prefetch window, and
//! acknowledge deliveries one by one. The AMQP adapter implements these;
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Broker-level failures.
#[derive(Debug, Error)]
pub enum QueueError {
  /// Could not open a connection or channel.
  #[error("queue connection failed: {0}")]
  Connect(String),
  /// Queue declaration, QoS or consumer setup failed.
  #[error("queue setup failed for {queue}: {reason}")]
  Setup { queue: String, reason: String },
  /// The delivery stream reported an error.
  #[error("delivery failed: {0}")]
  Delivery(String),
  /// Acknowledgment was rejected by the broker.
  #[error("acknowledgment failed for delivery {tag}: {reason}")]
  Ack { tag: u64, reason: String },
  /// Closing the channel or connection failed.
  #[error("queue close failed: {0}")]
  Close(String),
}

/// Queue to attach to and the consumer's prefetch window.
///
/// Queues are always declared non-durable, non-exclusive and
/// non-auto-delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
  /// Queue name.
  pub queue: String,
  /// Maximum unacknowledged deliveries in flight.
  pub prefetch: u16,
  /// Consumer tag presented to the broker.
  pub consumer_tag: String,
}

/// Acknowledges one delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
  async fn ack(&self) -> Result<(), QueueError>;
}

/// A single message received from the broker.
pub struct Delivery {
  /// Broker delivery tag.
  pub tag: u64,
  /// Raw message body.
  pub payload: Vec<u8>,
  acker: Box<dyn Acknowledger>,
}

impl Delivery {
  pub fn new(tag: u64, payload: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
    Self { tag, payload, acker }
  }

  /// Acknowledge this delivery to the broker.
  pub async fn ack(&self) -> Result<(), QueueError> {
    self.acker.ack().await
  }
}

impl std::fmt::Debug for Delivery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Delivery")
      .field("tag", &self.tag)
      .field("payload_len", &self.payload.len())
      .finish()
  }
}

/// Stream of deliveries for one consumer.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, QueueError>>;

/// Opens broker sessions.
#[async_trait]
pub trait QueueTransport: Send + Sync + 'static {
  /// Open a connection and channel on behalf of the named feed.
  async fn connect(&self, feed: &str) -> Result<Box<dyn QueueSession>, QueueError>;
}

/// An open connection plus channel.
#[async_trait]
pub trait QueueSession: Send + Sync {
  /// Declare the queue, apply the prefetch window and start consuming.
  async fn consume(&self, binding: &QueueBinding) -> Result<DeliveryStream, QueueError>;

  /// Close the channel, then the connection.
  async fn close(&self) -> Result<(), QueueError>;
}
