//! Use Cases Layer - Application Workflows
//!
//! Orchestrates domain logic with port interfaces. Each use case owns one
//! long-running concern and is driven by the shutdown broadcast.
//!
//! Use cases:
//! - `FeedPipeline`: queue consumption for one external feed
//! - `OrderPriceAdjuster`: reference-index repricing of order routes
//! - `MarketStateController`: Open/Closed session gate with periodic tick
//! - `Dispatcher`: interval-polled subscriber streams over the caches
//! - `RetryPolicy`: bounded retry shared by the pipelines

pub mod dispatch;
pub mod ingestion;
pub mod market_state;
pub mod order_adjuster;
pub mod retry;

pub use dispatch::{DispatchFilter, Dispatcher, PriceFilter, RouteFilter};
pub use ingestion::{FeedPipeline, PipelineState};
pub use market_state::{MarketStateController, MarketStateError};
pub use order_adjuster::{AdjustmentSummary, OrderPriceAdjuster};
pub use retry::{RetryExhausted, RetryPolicy};
