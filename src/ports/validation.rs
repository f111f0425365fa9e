//! Price Validation Port - Final Order Price Reconciliation
//!
//! The adjustment engine hands every computed target to a validator that
//! reconciles it against the security's current quote (bid/ask bounds,
//! tick rules) and writes the final order price onto the route.

use crate::domain::price::PriceRecord;
use crate::domain::route::RouteStatus;

pub trait PriceValidator: Send + Sync + 'static {
  /// Reconcile `route.target_price` against `security` and write the
  /// route's final order price fields.
  fn validate(&self, route: &mut RouteStatus, security: &PriceRecord);
}
