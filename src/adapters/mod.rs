//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure. Each sub-module groups adapters by concern.
//!
//! Adapter categories:
//! - `cache`: sharded in-memory price, route and order-error caches
//! - `feeds`: per-feed payload decoders and pipeline supervision
//! - `queue`: AMQP transport via lapin
//! - `metrics`: Prometheus metrics export and health checks
//! - `validation`: pass-through order price validation

pub mod cache;
pub mod feeds;
pub mod metrics;
pub mod queue;
pub mod validation;
