//! Telemetry Port - Operational Counters
//!
//! Use cases report outcomes here; the Prometheus adapter implements it.
//! Components built without telemetry use `NoopTelemetry`.

/// Outcome of one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
  /// Applied and acknowledged.
  Applied,
  /// Decode/apply failed, left unacknowledged.
  Rejected,
  /// Applied but the acknowledgment failed.
  AckFailed,
}

impl MessageOutcome {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Applied => "applied",
      Self::Rejected => "rejected",
      Self::AckFailed => "ack_failed",
    }
  }
}

/// Outcome of one route adjustment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentOutcome {
  Adjusted,
  Suppressed,
  Seeded,
}

impl AdjustmentOutcome {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Adjusted => "adjusted",
      Self::Suppressed => "suppressed",
      Self::Seeded => "seeded",
    }
  }
}

pub trait Telemetry: Send + Sync + 'static {
  fn record_message(&self, feed: &str, outcome: MessageOutcome);

  fn set_feed_consuming(&self, feed: &str, consuming: bool);

  fn record_adjustment(&self, outcome: AdjustmentOutcome);

  fn set_market_open(&self, open: bool);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
  fn record_message(&self, _feed: &str, _outcome: MessageOutcome) {}

  fn set_feed_consuming(&self, _feed: &str, _consuming: bool) {}

  fn record_adjustment(&self, _outcome: AdjustmentOutcome) {}

  fn set_market_open(&self, _open: bool) {}
}
