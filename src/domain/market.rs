//! Market session state and the process-wide data-ready gate.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Trading session state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketState {
    #[default]
    Closed,
    Open,
}

impl std::fmt::Display for MarketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Notification broadcast to every dispatch subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketEvent {
    Opened,
    Closed,
    Reset,
    /// Periodic tick while the market is open, with a sequence number.
    Tick(u64),
}

impl MarketEvent {
    /// Event name as exposed to streaming clients.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opened => "market_opened",
            Self::Closed => "market_closed",
            Self::Reset => "market_reset",
            Self::Tick(_) => "market_tick",
        }
    }
}

/// Gate flipped once reference data has finished loading.
///
/// Dispatch loops emit nothing until it is set.
#[derive(Debug, Default)]
pub struct DataReadyFlag {
    ready: AtomicBool,
}

impl DataReadyFlag {
    pub fn new(ready: bool) -> Self {
        Self {
            ready: AtomicBool::new(ready),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Set the flag, returning the previous value.
    pub fn set(&self, ready: bool) -> bool {
        self.ready.swap(ready, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_starts_closed() {
        assert_eq!(MarketState::default(), MarketState::Closed);
    }

    #[test]
    fn test_data_ready_flag_swap() {
        let flag = DataReadyFlag::default();
        assert!(!flag.is_ready());
        assert!(!flag.set(true));
        assert!(flag.is_ready());
        assert!(flag.set(false));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(MarketEvent::Opened.name(), "market_opened");
        assert_eq!(MarketEvent::Tick(3).name(), "market_tick");
    }
}
