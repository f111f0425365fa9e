//! Message broker adapters.

pub mod amqp;

pub use amqp::{AmqpSession, AmqpTransport};
