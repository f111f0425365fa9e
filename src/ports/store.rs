//! Store Port - Shared Cache Interfaces
//!
//! Every component receives the caches it needs by injection through
//! these traits; there is no process-global cache.

use crate::domain::price::{PriceRecord, PriceUpdate, UpsertOutcome};

/// Live price cache keyed by ticker.
///
/// Implementations must accept concurrent writers (one per feed) and
/// concurrent readers (dispatch loops, the order adjuster) without callers
/// taking external locks. Consistency is per ticker, last write wins.
pub trait PriceStore: Send + Sync + 'static {
  /// Current record for a ticker, if it has ever been observed.
  fn get(&self, ticker: &str) -> Option<PriceRecord>;

  /// Create the record on first write, otherwise merge the supplied fields.
  fn upsert(&self, ticker: &str, update: &PriceUpdate) -> UpsertOutcome;

  /// Point-in-time copy of every record.
  fn snapshot(&self) -> Vec<PriceRecord>;

  /// Number of tickers held.
  fn len(&self) -> usize;

  /// Whether no ticker has been observed yet.
  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Anything a dispatch loop can poll for records.
pub trait SnapshotSource<T>: Send + Sync + 'static {
  fn snapshot(&self) -> Vec<T>;
}
