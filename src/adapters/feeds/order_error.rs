//! Order Error Feed - Venue Rejections

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use super::wire::decode;
use crate::adapters::cache::OrderErrorBook;
use crate::domain::order_error::OrderErrorRecord;
use crate::ports::feed::{FeedError, FeedHandler};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderErrorMsg {
    order_id: String,
    ticker: Option<String>,
    error_code: Option<String>,
    message: String,
    timestamp: Option<DateTime<Utc>>,
}

/// Decoder for the order-error feed.
pub struct OrderErrorFeed {
    name: String,
    book: Arc<OrderErrorBook>,
}

impl OrderErrorFeed {
    pub fn new(name: impl Into<String>, book: Arc<OrderErrorBook>) -> Self {
        Self {
            name: name.into(),
            book,
        }
    }
}

impl FeedHandler for OrderErrorFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, payload: &[u8]) -> Result<usize, FeedError> {
        let msg: OrderErrorMsg = decode(&self.name, payload)?;
        if msg.order_id.is_empty() {
            return Err(FeedError::MessageProcessing {
                feed: self.name.clone(),
                reason: "empty order id".to_string(),
            });
        }

        warn!(
            order_id = %msg.order_id,
            ticker = msg.ticker.as_deref().unwrap_or("-"),
            code = msg.error_code.as_deref().unwrap_or("-"),
            message = %msg.message,
            "order rejected by venue"
        );

        self.book.record(OrderErrorRecord {
            order_id: msg.order_id,
            ticker: msg.ticker,
            error_code: msg.error_code,
            message: msg.message,
            received_at: msg.timestamp.unwrap_or_else(Utc::now),
        });
        Ok(1)
    }
}
