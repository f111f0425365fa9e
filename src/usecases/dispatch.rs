//! Dispatch Layer - Interval-Polled Subscriber Streams
//!
//! Every subscription is its own lazily-polled stream: wait the interval,
//! check the data-ready flag (and the market gate if the filter needs an
//! open market), then yield the matching records of one snapshot. Nothing
//! here blocks the feeds; a slow subscriber only delays itself.
//!
//! Cancellation uses the crate's shutdown idiom, a `broadcast::Receiver<()>`.
//! A message, a lag or a dropped sender all cancel. It is checked while
//! waiting and before every yield.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::domain::market::{DataReadyFlag, MarketState};
use crate::domain::price::PriceRecord;
use crate::domain::route::RouteStatus;
use crate::ports::store::SnapshotSource;

/// Record filter for a subscription.
pub trait DispatchFilter<T>: Send + Sync + 'static {
  fn matches(&self, item: &T) -> bool;

  /// Emit only while the market is open.
  fn requires_open_market(&self) -> bool {
    false
  }
}

impl<T, F> DispatchFilter<T> for F
where
  F: Fn(&T) -> bool + Send + Sync + 'static,
{
  fn matches(&self, item: &T) -> bool {
    self(item)
  }
}

/// Price record filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceFilter {
  All,
  /// Real-time feed and open market; gated on the market state.
  RealTime,
  /// Delayed or derived records.
  Delayed,
}

impl DispatchFilter<PriceRecord> for PriceFilter {
  fn matches(&self, record: &PriceRecord) -> bool {
    match self {
      Self::All => true,
      Self::RealTime => record.is_live(),
      Self::Delayed => record.rt_flag == crate::domain::price::RT_DELAYED,
    }
  }

  fn requires_open_market(&self) -> bool {
    matches!(self, Self::RealTime)
  }
}

/// Route status filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFilter {
  All,
  /// Routes that have been repriced at least once.
  Adjusted,
}

impl DispatchFilter<RouteStatus> for RouteFilter {
  fn matches(&self, route: &RouteStatus) -> bool {
    match self {
      Self::All => true,
      Self::Adjusted => route.raw_change.is_some() && route.target_price.is_some(),
    }
  }
}

/// Builds subscriber streams over the shared caches.
#[derive(Clone)]
pub struct Dispatcher {
  data_ready: Arc<DataReadyFlag>,
  market: watch::Receiver<MarketState>,
  min_interval: Duration,
}

impl Dispatcher {
  pub fn new(data_ready: Arc<DataReadyFlag>, market: watch::Receiver<MarketState>) -> Self {
    Self {
      data_ready,
      market,
      min_interval: Duration::from_millis(1),
    }
  }

  /// Clamp requested intervals to at least `min`.
  pub fn with_min_interval(mut self, min: Duration) -> Self {
    self.min_interval = min;
    self
  }

  /// Stream the records of `source` that pass `filter`, one snapshot per
  /// `interval`, until `cancel` fires.
  pub fn subscribe<T, S, F>(
    &self,
    source: Arc<S>,
    interval: Duration,
    filter: F,
    cancel: broadcast::Receiver<()>,
  ) -> impl Stream<Item = T> + Send + use<T, S, F>
  where
    T: Send + 'static,
    S: SnapshotSource<T> + ?Sized,
    F: DispatchFilter<T>,
  {
    let subscription = Subscription {
      source,
      filter,
      interval: interval.max(self.min_interval),
      cancel,
      data_ready: Arc::clone(&self.data_ready),
      market: self.market.clone(),
      pending: VecDeque::new(),
    };

    stream::unfold(subscription, |mut sub| async move {
      let item = sub.next_item().await?;
      Some((item, sub))
    })
    .fuse()
  }
}

struct Subscription<T, S: ?Sized, F> {
  source: Arc<S>,
  filter: F,
  interval: Duration,
  cancel: broadcast::Receiver<()>,
  data_ready: Arc<DataReadyFlag>,
  market: watch::Receiver<MarketState>,
  /// Matching records of the current snapshot not yet yielded.
  pending: VecDeque<T>,
}

impl<T, S, F> Subscription<T, S, F>
where
  S: SnapshotSource<T> + ?Sized,
  F: DispatchFilter<T>,
{
  /// Next record to yield, or `None` once cancelled.
  async fn next_item(&mut self) -> Option<T> {
    loop {
      if let Some(item) = self.pending.pop_front() {
        if self.cancelled() {
          return self.finish();
        }
        return Some(item);
      }

      tokio::select! {
        _ = self.cancel.recv() => return self.finish(),
        _ = tokio::time::sleep(self.interval) => {}
      }

      if !self.data_ready.is_ready() {
        continue;
      }
      if self.filter.requires_open_market() && *self.market.borrow() != MarketState::Open {
        continue;
      }

      let filter = &self.filter;
      self
        .pending
        .extend(self.source.snapshot().into_iter().filter(|item| filter.matches(item)));
    }
  }

  fn cancelled(&mut self) -> bool {
    !matches!(self.cancel.try_recv(), Err(TryRecvError::Empty))
  }

  fn finish(&mut self) -> Option<T> {
    self.pending.clear();
    debug!("Dispatch subscription cancelled");
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use crate::adapters::cache::PriceCache;
  use crate::domain::price::{PriceUpdate, MKT_OPEN, RT_DELAYED, RT_REAL_TIME};

  fn cache() -> Arc<PriceCache> {
    let cache = Arc::new(PriceCache::new());
    cache.upsert(
      "BTC-USD",
      &PriceUpdate {
        last_price: Some(64000.0),
        rt_flag: Some(RT_REAL_TIME),
        mkt_cls: Some(MKT_OPEN),
        ..Default::default()
      },
    );
    cache.upsert(
      "IBM",
      &PriceUpdate {
        last_price: Some(180.0),
        rt_flag: Some(RT_DELAYED),
        ..Default::default()
      },
    );
    cache
  }

  fn dispatcher(ready: bool, market: MarketState) -> (Dispatcher, watch::Sender<MarketState>) {
    let (tx, rx) = watch::channel(market);
    (Dispatcher::new(Arc::new(DataReadyFlag::new(ready)), rx), tx)
  }

  #[tokio::test]
  async fn test_delayed_filter_yields_matching_records() {
    let (dispatch, _market) = dispatcher(true, MarketState::Closed);
    let (_cancel_tx, cancel) = broadcast::channel(1);

    let stream = dispatch.subscribe(cache(), Duration::from_millis(5), PriceFilter::Delayed, cancel);
    tokio::pin!(stream);

    let record = stream.next().await.unwrap();
    assert_eq!(record.ticker, "IBM");
  }

  #[tokio::test]
  async fn test_nothing_before_data_ready() {
    let (dispatch, _market) = dispatcher(false, MarketState::Open);
    let (_cancel_tx, cancel) = broadcast::channel(1);

    let stream = dispatch.subscribe(cache(), Duration::from_millis(5), PriceFilter::All, cancel);
    tokio::pin!(stream);

    let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(next.is_err());
  }

  #[tokio::test]
  async fn test_real_time_waits_for_open_market() {
    let (dispatch, market) = dispatcher(true, MarketState::Closed);
    let (_cancel_tx, cancel) = broadcast::channel(1);

    let stream = dispatch.subscribe(cache(), Duration::from_millis(5), PriceFilter::RealTime, cancel);
    tokio::pin!(stream);

    assert!(tokio::time::timeout(Duration::from_millis(40), stream.next()).await.is_err());

    market.send_replace(MarketState::Open);
    let record = stream.next().await.unwrap();
    assert_eq!(record.ticker, "BTC-USD");
  }

  #[tokio::test]
  async fn test_closure_filter_and_cancellation() {
    let (dispatch, _market) = dispatcher(true, MarketState::Open);
    let (cancel_tx, cancel) = broadcast::channel(1);

    let stream = dispatch.subscribe(
      cache(),
      Duration::from_millis(5),
      |r: &PriceRecord| r.ticker.starts_with("BTC"),
      cancel,
    );
    tokio::pin!(stream);

    assert_eq!(stream.next().await.unwrap().ticker, "BTC-USD");
    cancel_tx.send(()).unwrap();
    assert!(stream.next().await.is_none());
  }

  #[tokio::test]
  async fn test_dropped_sender_cancels() {
    let (dispatch, _market) = dispatcher(true, MarketState::Open);
    let (cancel_tx, cancel) = broadcast::channel::<()>(1);
    drop(cancel_tx);

    let stream = dispatch.subscribe(cache(), Duration::from_millis(5), PriceFilter::All, cancel);
    tokio::pin!(stream);
    assert!(stream.next().await.is_none());
  }

  #[test]
  fn test_route_filter() {
    let mut route = RouteStatus::new("r1", "XYZ", "SPY", crate::domain::route::AdjustmentStrategy::Beta);
    assert!(!RouteFilter::Adjusted.matches(&route));
    route.raw_change = Some(0.01);
    route.target_price = Some(10.0);
    assert!(RouteFilter::Adjusted.matches(&route));
  }
}
