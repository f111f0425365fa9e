//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `PriceStore` / `SnapshotSource`: shared caches
//! - `QueueTransport` / `QueueSession`: message broker access
//! - `FeedHandler`: per-feed payload decoding
//! - `PriceValidator`: final order price reconciliation
//! - `SessionHooks`: market session side effects
//! - `Telemetry`: operational counters

pub mod feed;
pub mod queue;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod validation;
