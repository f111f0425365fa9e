//! Pass-through price validation.
//!
//! Stand-in for the desk's order-price validation service: accepts the
//! computed target as the order price. Bid/ask reconciliation and tick-size
//! rules belong to that service, not here.

use chrono::Utc;
use tracing::trace;

use crate::domain::price::PriceRecord;
use crate::domain::route::RouteStatus;
use crate::ports::validation::PriceValidator;

#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughValidator;

impl PriceValidator for PassThroughValidator {
    fn validate(&self, route: &mut RouteStatus, security: &PriceRecord) {
        route.order_price = route.target_price;
        route.updated_at = Utc::now();
        trace!(
            route_id = %route.route_id,
            ticker = %security.ticker,
            order_price = ?route.order_price,
            "order price accepted"
        );
    }
}
