//! Order rejections reported by the routing venue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest error reported for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderErrorRecord {
    pub order_id: String,
    pub ticker: Option<String>,
    pub error_code: Option<String>,
    pub message: String,
    pub received_at: DateTime<Utc>,
}
