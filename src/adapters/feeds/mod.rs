//! Feed Adapters - Payload Decoders and Pipeline Supervision
//!
//! One decoder per feed kind, each implementing `FeedHandler`:
//! - `EquityBatchFeed`: batched equity quotes
//! - `CryptoTradeFeed` / `CryptoQuoteFeed`: crypto prints and quotes
//! - `OrderErrorFeed`: venue rejections into the order-error book
//! - `JobUpdateFeed`: data-load signals driving the data-ready flag
//!
//! `FeedSupervisor` runs one pipeline task per enabled feed.

pub mod crypto;
pub mod equity;
pub mod job_update;
pub mod order_error;
pub mod task_supervisor;
pub mod wire;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::adapters::cache::OrderErrorBook;
use crate::config::{FeedConfig, FeedKind};
use crate::domain::market::DataReadyFlag;
use crate::ports::feed::FeedHandler;
use crate::ports::store::PriceStore;

pub use crypto::{CryptoQuoteFeed, CryptoTradeFeed};
pub use equity::EquityBatchFeed;
pub use job_update::JobUpdateFeed;
pub use order_error::OrderErrorFeed;
pub use task_supervisor::FeedSupervisor;

/// Caches and flags the decoders write into.
#[derive(Clone)]
pub struct FeedTargets {
    pub prices: Arc<dyn PriceStore>,
    pub order_errors: Arc<OrderErrorBook>,
    pub data_ready: Arc<DataReadyFlag>,
}

/// Build the decoder for a configured feed.
pub fn build_handler(feed: &FeedConfig, targets: &FeedTargets) -> Result<Arc<dyn FeedHandler>> {
    let handler: Arc<dyn FeedHandler> = match feed.kind {
        FeedKind::EquityBatch => Arc::new(EquityBatchFeed::new(
            &feed.name,
            feed.source_tag(),
            feed.real_time,
            Arc::clone(&targets.prices),
        )),
        FeedKind::CryptoTrade => Arc::new(CryptoTradeFeed::new(
            &feed.name,
            feed.source_tag(),
            Arc::clone(&targets.prices),
        )),
        FeedKind::CryptoQuote => Arc::new(CryptoQuoteFeed::new(
            &feed.name,
            feed.source_tag(),
            Arc::clone(&targets.prices),
        )),
        FeedKind::OrderError => Arc::new(OrderErrorFeed::new(
            &feed.name,
            Arc::clone(&targets.order_errors),
        )),
        FeedKind::JobUpdate => {
            let ready_job = feed
                .ready_job
                .as_deref()
                .with_context(|| format!("feed {} has no ready_job", feed.name))?;
            Arc::new(JobUpdateFeed::new(
                &feed.name,
                ready_job,
                Arc::clone(&targets.data_ready),
            ))
        }
    };
    Ok(handler)
}
