//! JSON wire schema shared by the price feeds.
//!
//! Every field except the ticker is optional. Absent fields are "not
//! supplied" and never default to zero; unknown fields are ignored.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::domain::price::PriceUpdate;
use crate::ports::feed::FeedError;

/// Quote/trade object as published on the price queues.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireQuote {
    pub ticker: String,
    pub last_price: Option<f64>,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    pub last_size: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    pub volume: Option<f64>,
    pub change_pct: Option<f64>,
    pub pct_return: Option<f64>,
    pub prior_close: Option<f64>,
    pub trade_date: Option<NaiveDate>,
    pub trade_time: Option<NaiveTime>,
    pub rt_flag: Option<u8>,
    pub mkt_cls: Option<u8>,
}

impl WireQuote {
    /// Map every supplied field onto a partial update.
    pub fn to_update(&self) -> PriceUpdate {
        PriceUpdate {
            last_price: self.last_price,
            bid_price: self.bid_price,
            ask_price: self.ask_price,
            close_price: self.prior_close,
            last_size: self.last_size,
            bid_size: self.bid_size,
            ask_size: self.ask_size,
            volume: self.volume,
            volume_increment: None,
            pct_return: self.pct_return,
            pct_change: self.change_pct,
            trade_date: self.trade_date,
            trade_time: self.trade_time,
            source: None,
            rt_flag: self.rt_flag,
            mkt_cls: self.mkt_cls,
        }
    }
}

/// Deserialize a payload, mapping failures to a processing error for `feed`.
pub fn decode<'a, T: Deserialize<'a>>(feed: &str, payload: &'a [u8]) -> Result<T, FeedError> {
    serde_json::from_slice(payload).map_err(|e| FeedError::MessageProcessing {
        feed: feed.to_string(),
        reason: format!("invalid payload: {e}"),
    })
}

/// Reject blank tickers before they become cache keys.
pub fn require_ticker(feed: &str, ticker: &str) -> Result<(), FeedError> {
    if ticker.trim().is_empty() {
        return Err(FeedError::MessageProcessing {
            feed: feed.to_string(),
            reason: "empty ticker".to_string(),
        });
    }
    Ok(())
}
