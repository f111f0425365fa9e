//! Domain layer - price records, route status and pricing rules.
//!
//! Pure data and computation. Nothing here touches queues, sockets or
//! shared caches; those live behind the ports.

pub mod adjustment;
pub mod market;
pub mod order_error;
pub mod price;
pub mod route;

pub use adjustment::{Adjustment, AdjustmentError, Direction};
pub use market::{DataReadyFlag, MarketEvent, MarketState};
pub use order_error::OrderErrorRecord;
pub use price::{PriceRecord, PriceTick, PriceUpdate, Ticker, UpsertOutcome};
pub use route::{AdjustmentStrategy, RouteId, RouteStatus};
