//! Order Error Book - Latest Rejection Per Order

use dashmap::DashMap;

use crate::domain::order_error::OrderErrorRecord;
use crate::ports::store::SnapshotSource;

/// Concurrent order id -> latest error record.
#[derive(Default)]
pub struct OrderErrorBook {
    errors: DashMap<String, OrderErrorRecord>,
}

impl OrderErrorBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the error, replacing any earlier one for the same order.
    pub fn record(&self, error: OrderErrorRecord) {
        self.errors.insert(error.order_id.clone(), error);
    }

    pub fn get(&self, order_id: &str) -> Option<OrderErrorRecord> {
        self.errors.get(order_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl SnapshotSource<OrderErrorRecord> for OrderErrorBook {
    fn snapshot(&self) -> Vec<OrderErrorRecord> {
        self.errors.iter().map(|e| e.value().clone()).collect()
    }
}
