//! Live price records and field-level merge semantics.
//!
//! A `PriceRecord` is created on the first observation of a ticker from any
//! feed and is then mutated in place. A `PriceUpdate` carries only the fields
//! a feed actually supplied; everything left as `None` keeps its prior value.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticker symbol, the unique identity of a price record.
pub type Ticker = String;

/// `rt_flag` value for records fed by a real-time source.
pub const RT_REAL_TIME: u8 = 1;
/// `rt_flag` value for delayed or derived records.
pub const RT_DELAYED: u8 = 0;
/// `mkt_cls` value while the instrument's session is open.
pub const MKT_OPEN: u8 = 0;
/// `mkt_cls` value once the instrument's session has closed.
pub const MKT_CLOSED: u8 = 1;

/// Live price state for a single ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Ticker symbol.
    pub ticker: Ticker,
    /// Last traded price.
    pub last_price: Option<f64>,
    /// Best bid.
    pub bid_price: Option<f64>,
    /// Best ask.
    pub ask_price: Option<f64>,
    /// Prior session close.
    pub close_price: Option<f64>,
    /// Size of the last trade.
    pub last_size: Option<f64>,
    /// Size at the best bid.
    pub bid_size: Option<f64>,
    /// Size at the best ask.
    pub ask_size: Option<f64>,
    /// Session volume.
    pub volume: Option<f64>,
    /// Percent return as supplied by the feed (fraction, not x100).
    pub pct_return: Option<f64>,
    /// Percent change versus prior close (fraction, not x100).
    pub pct_change: Option<f64>,
    /// Trade date reported by the feed.
    pub trade_date: Option<NaiveDate>,
    /// Trade time reported by the feed.
    pub trade_time: Option<NaiveTime>,
    /// Tag of the feed that last wrote this record.
    pub source: Option<String>,
    /// 1 = real-time feed, 0 = delayed/derived.
    pub rt_flag: u8,
    /// 0 = market open, 1 = market closed.
    pub mkt_cls: u8,
    /// Wall-clock time of the last merge.
    pub updated_at: DateTime<Utc>,
}

impl PriceRecord {
    /// Empty record for a ticker seen for the first time.
    pub fn new(ticker: impl Into<Ticker>) -> Self {
        Self {
            ticker: ticker.into(),
            last_price: None,
            bid_price: None,
            ask_price: None,
            close_price: None,
            last_size: None,
            bid_size: None,
            ask_size: None,
            volume: None,
            pct_return: None,
            pct_change: None,
            trade_date: None,
            trade_time: None,
            source: None,
            rt_flag: RT_DELAYED,
            mkt_cls: MKT_OPEN,
            updated_at: Utc::now(),
        }
    }

    /// Whether this record is real-time and its market is still open.
    pub fn is_live(&self) -> bool {
        self.rt_flag == RT_REAL_TIME && self.mkt_cls == MKT_OPEN
    }

    /// Merge a partial update into this record.
    ///
    /// Only `Some` fields are written. When the update carries a last price
    /// but no percent change, the change is derived from the merged last and
    /// close prices.
    pub fn apply(&mut self, update: &PriceUpdate) {
        merge(&mut self.last_price, update.last_price);
        merge(&mut self.bid_price, update.bid_price);
        merge(&mut self.ask_price, update.ask_price);
        merge(&mut self.close_price, update.close_price);
        merge(&mut self.last_size, update.last_size);
        merge(&mut self.bid_size, update.bid_size);
        merge(&mut self.ask_size, update.ask_size);
        merge(&mut self.volume, update.volume);
        merge(&mut self.pct_return, update.pct_return);
        merge(&mut self.trade_date, update.trade_date);
        merge(&mut self.trade_time, update.trade_time);

        if let Some(increment) = update.volume_increment {
            self.volume = Some(self.volume.unwrap_or(0.0) + increment);
        }

        match update.pct_change {
            Some(change) => self.pct_change = Some(change),
            None if update.last_price.is_some() || update.close_price.is_some() => {
                if let (Some(last), Some(close)) = (self.last_price, self.close_price) {
                    if let Some(change) = derive_pct_change(last, close) {
                        self.pct_change = Some(change);
                    }
                }
            }
            None => {}
        }

        if let Some(source) = &update.source {
            self.source = Some(source.clone());
        }
        if let Some(flag) = update.rt_flag {
            self.rt_flag = flag;
        }
        if let Some(flag) = update.mkt_cls {
            self.mkt_cls = flag;
        }

        self.updated_at = Utc::now();
    }
}

fn merge<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// `(last - prior_close) / prior_close`, only when both prices are positive.
pub fn derive_pct_change(last: f64, prior_close: f64) -> Option<f64> {
    if last > 0.0 && prior_close > 0.0 {
        Some((last - prior_close) / prior_close)
    } else {
        None
    }
}

/// Partial update produced by a feed decoder. `None` = not supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceUpdate {
    /// Last traded price.
    pub last_price: Option<f64>,
    /// Best bid.
    pub bid_price: Option<f64>,
    /// Best ask.
    pub ask_price: Option<f64>,
    /// Prior session close.
    pub close_price: Option<f64>,
    /// Size of the last trade.
    pub last_size: Option<f64>,
    /// Size at the best bid.
    pub bid_size: Option<f64>,
    /// Size at the best ask.
    pub ask_size: Option<f64>,
    /// Session volume, replacing the stored value.
    pub volume: Option<f64>,
    /// Added to the existing volume rather than replacing it.
    pub volume_increment: Option<f64>,
    /// Percent return (fraction).
    pub pct_return: Option<f64>,
    /// Percent change versus prior close (fraction). Derived when absent.
    pub pct_change: Option<f64>,
    /// Trade date reported by the feed.
    pub trade_date: Option<NaiveDate>,
    /// Trade time reported by the feed.
    pub trade_time: Option<NaiveTime>,
    /// Tag of the writing feed.
    pub source: Option<String>,
    /// 1 = real-time feed, 0 = delayed/derived.
    pub rt_flag: Option<u8>,
    /// 0 = market open, 1 = market closed.
    pub mkt_cls: Option<u8>,
}

/// Whether an upsert created a new record or merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Notification published when a ticker's last price is written.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub ticker: Ticker,
    pub last_price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = PriceRecord::new("AAPL");
        assert_eq!(record.ticker, "AAPL");
        assert_eq!(record.rt_flag, RT_DELAYED);
        assert_eq!(record.mkt_cls, MKT_OPEN);
        assert!(record.last_price.is_none());
    }

    #[test]
    fn test_apply_keeps_unsupplied_fields() {
        let mut record = PriceRecord::new("MSFT");
        record.apply(&PriceUpdate {
            bid_price: Some(99.0),
            ask_price: Some(101.0),
            ..Default::default()
        });
        record.apply(&PriceUpdate {
            last_price: Some(100.5),
            ..Default::default()
        });

        assert_eq!(record.bid_price, Some(99.0));
        assert_eq!(record.ask_price, Some(101.0));
        assert_eq!(record.last_price, Some(100.5));
    }

    #[test]
    fn test_derives_change_from_existing_close() {
        let mut record = PriceRecord::new("BTC-USD");
        record.apply(&PriceUpdate {
            close_price: Some(50_000.0),
            ..Default::default()
        });
        record.apply(&PriceUpdate {
            last_price: Some(51_000.0),
            ..Default::default()
        });

        let change = record.pct_change.unwrap();
        assert!((change - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_supplied_change_wins_over_derivation() {
        let mut record = PriceRecord::new("IBM");
        record.apply(&PriceUpdate {
            last_price: Some(110.0),
            close_price: Some(100.0),
            pct_change: Some(0.5),
            ..Default::default()
        });
        assert_eq!(record.pct_change, Some(0.5));
    }

    #[test]
    fn test_no_derivation_for_non_positive_close() {
        assert_eq!(derive_pct_change(10.0, 0.0), None);
        assert_eq!(derive_pct_change(10.0, -5.0), None);
        assert_eq!(derive_pct_change(0.0, 5.0), None);

        let mut record = PriceRecord::new("ZERO");
        record.apply(&PriceUpdate {
            last_price: Some(10.0),
            close_price: Some(0.0),
            ..Default::default()
        });
        assert!(record.pct_change.is_none());
    }

    #[test]
    fn test_volume_increment_accumulates() {
        let mut record = PriceRecord::new("ETH-USD");
        let trade = PriceUpdate {
            volume_increment: Some(1.5),
            ..Default::default()
        };
        record.apply(&trade);
        record.apply(&trade);
        assert_eq!(record.volume, Some(3.0));
    }

    #[test]
    fn test_flags_only_change_when_supplied() {
        let mut record = PriceRecord::new("SPY");
        record.apply(&PriceUpdate {
            rt_flag: Some(RT_REAL_TIME),
            ..Default::default()
        });
        assert!(record.is_live());

        record.apply(&PriceUpdate {
            last_price: Some(1.0),
            ..Default::default()
        });
        assert!(record.is_live());

        record.apply(&PriceUpdate {
            mkt_cls: Some(MKT_CLOSED),
            ..Default::default()
        });
        assert!(!record.is_live());
    }
}
