//! Crypto Feeds - Trade Prints and Top-of-Book Quotes
//!
//! Two independent queues feed the same tickers: trades set the last price
//! and accumulate volume, quotes set the bid/ask side. Both are real-time
//! and crypto markets never close, so both flags are stamped on every write.

use std::sync::Arc;

use serde::Deserialize;
use tracing::trace;

use super::wire::{decode, require_ticker};
use crate::domain::price::{PriceUpdate, MKT_OPEN, RT_REAL_TIME};
use crate::ports::feed::{FeedError, FeedHandler};
use crate::ports::store::PriceStore;

/// Trade print message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeMsg {
    ticker: String,
    last_price: f64,
    last_size: Option<f64>,
    change_pct: Option<f64>,
    prior_close: Option<f64>,
}

/// Quote message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteMsg {
    ticker: String,
    bid_price: Option<f64>,
    ask_price: Option<f64>,
    bid_size: Option<f64>,
    ask_size: Option<f64>,
}

/// Decoder for the crypto trade feed.
pub struct CryptoTradeFeed {
    name: String,
    source: String,
    store: Arc<dyn PriceStore>,
}

impl CryptoTradeFeed {
    pub fn new(name: impl Into<String>, source: impl Into<String>, store: Arc<dyn PriceStore>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            store,
        }
    }
}

impl FeedHandler for CryptoTradeFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, payload: &[u8]) -> Result<usize, FeedError> {
        let msg: TradeMsg = decode(&self.name, payload)?;
        require_ticker(&self.name, &msg.ticker)?;

        if !msg.last_price.is_finite() || msg.last_price <= 0.0 {
            return Err(FeedError::MessageProcessing {
                feed: self.name.clone(),
                reason: format!("{}: non-positive trade price {}", msg.ticker, msg.last_price),
            });
        }

        // Redelivery of an unacknowledged trade adds its size again.
        let update = PriceUpdate {
            last_price: Some(msg.last_price),
            last_size: msg.last_size,
            volume_increment: msg.last_size,
            close_price: msg.prior_close,
            pct_change: msg.change_pct,
            source: Some(self.source.clone()),
            rt_flag: Some(RT_REAL_TIME),
            mkt_cls: Some(MKT_OPEN),
            ..Default::default()
        };
        self.store.upsert(&msg.ticker, &update);

        trace!(feed = %self.name, ticker = %msg.ticker, price = msg.last_price, "trade applied");
        Ok(1)
    }
}

/// Decoder for the crypto quote feed.
pub struct CryptoQuoteFeed {
    name: String,
    source: String,
    store: Arc<dyn PriceStore>,
}

impl CryptoQuoteFeed {
    pub fn new(name: impl Into<String>, source: impl Into<String>, store: Arc<dyn PriceStore>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            store,
        }
    }
}

impl FeedHandler for CryptoQuoteFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, payload: &[u8]) -> Result<usize, FeedError> {
        let msg: QuoteMsg = decode(&self.name, payload)?;
        require_ticker(&self.name, &msg.ticker)?;

        let update = PriceUpdate {
            bid_price: msg.bid_price,
            ask_price: msg.ask_price,
            bid_size: msg.bid_size,
            ask_size: msg.ask_size,
            source: Some(self.source.clone()),
            rt_flag: Some(RT_REAL_TIME),
            mkt_cls: Some(MKT_OPEN),
            ..Default::default()
        };
        self.store.upsert(&msg.ticker, &update);
        Ok(1)
    }
}
