//! Shared In-Memory Caches
//!
//! - `PriceCache`: live price records keyed by ticker
//! - `RouteStatusCache`: active order routes with reference dependencies
//! - `OrderErrorBook`: latest venue rejection per order

pub mod order_errors;
pub mod price_cache;
pub mod route_cache;

pub use order_errors::OrderErrorBook;
pub use price_cache::PriceCache;
pub use route_cache::RouteStatusCache;
