//! Equity Pricing Feed - Batched Quote Updates
//!
//! Each message is a JSON array of quote objects. Every quote in the batch
//! is merged into the price cache; the batch is rejected as a whole if it
//! does not decode.

use std::sync::Arc;

use tracing::debug;

use super::wire::{decode, require_ticker, WireQuote};
use crate::domain::price::{RT_DELAYED, RT_REAL_TIME};
use crate::ports::feed::{FeedError, FeedHandler};
use crate::ports::store::PriceStore;

/// Decoder for the equity batch feed.
pub struct EquityBatchFeed {
    /// Feed name.
    name: String,
    /// Source tag written onto records.
    source: String,
    /// RT flag used when a quote does not carry one.
    default_rt_flag: u8,
    /// Destination cache.
    store: Arc<dyn PriceStore>,
}

impl EquityBatchFeed {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        real_time: bool,
        store: Arc<dyn PriceStore>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            default_rt_flag: if real_time { RT_REAL_TIME } else { RT_DELAYED },
            store,
        }
    }
}

impl FeedHandler for EquityBatchFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, payload: &[u8]) -> Result<usize, FeedError> {
        let batch: Vec<WireQuote> = decode(&self.name, payload)?;
        for quote in &batch {
            require_ticker(&self.name, &quote.ticker)?;
        }

        for quote in &batch {
            let mut update = quote.to_update();
            update.source = Some(self.source.clone());
            update.rt_flag.get_or_insert(self.default_rt_flag);
            self.store.upsert(&quote.ticker, &update);
        }

        debug!(feed = %self.name, records = batch.len(), "equity batch applied");
        Ok(batch.len())
    }
}
