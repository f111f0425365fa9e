//! Order-route status tracked for reference-index pricing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::price::Ticker;

/// Order route identifier.
pub type RouteId = String;

/// How a reference move is translated into a target price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStrategy {
    /// Scale the reference percent change by a beta coefficient.
    Beta,
    /// Track the reference percent change one-for-one.
    Delta,
    /// Follow the reference price plus a fixed offset.
    Absolute,
}

impl std::fmt::Display for AdjustmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beta => write!(f, "beta"),
            Self::Delta => write!(f, "delta"),
            Self::Absolute => write!(f, "absolute"),
        }
    }
}

/// Reference-index state of a single active order route.
///
/// Numeric inputs are optional because the order-management side may leave
/// them unset; the adjustment engine reads unset values as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStatus {
    /// Route identifier.
    pub route_id: RouteId,
    /// Security the order trades.
    pub ticker: Ticker,
    /// Instrument whose moves drive the target price.
    pub reference_ticker: Ticker,
    /// Strategy tag chosen when the route was created.
    pub strategy: AdjustmentStrategy,
    /// Reference price at the previous adjustment.
    #[serde(default)]
    pub last_ref_price: Option<f64>,
    /// Most recent reference price observed.
    #[serde(default)]
    pub live_ref_price: Option<f64>,
    /// Reference percent change before scaling and capping.
    #[serde(default)]
    pub raw_change: Option<f64>,
    /// Beta, delta or absolute offset, depending on `strategy`.
    #[serde(default)]
    pub coefficient: Option<f64>,
    /// Maximum magnitude of an adjustment.
    #[serde(default)]
    pub price_cap: Option<f64>,
    /// 0 = scale both directions, >0 = up-moves only, <0 = down-moves only.
    #[serde(default)]
    pub beta_shift: i32,
    /// 0 = cap both directions, >0 = up-moves only, <0 = down-moves only.
    #[serde(default)]
    pub cap_shift: i32,
    /// Final change after scaling and capping.
    #[serde(default)]
    pub capped_change: Option<f64>,
    /// Target price produced by the last adjustment.
    #[serde(default)]
    pub target_price: Option<f64>,
    /// Price written by the validation collaborator.
    #[serde(default)]
    pub order_price: Option<f64>,
    /// Last time any field was written.
    pub updated_at: DateTime<Utc>,
}

impl RouteStatus {
    /// New route with no reference history.
    pub fn new(
        route_id: impl Into<RouteId>,
        ticker: impl Into<Ticker>,
        reference_ticker: impl Into<Ticker>,
        strategy: AdjustmentStrategy,
    ) -> Self {
        Self {
            route_id: route_id.into(),
            ticker: ticker.into(),
            reference_ticker: reference_ticker.into(),
            strategy,
            last_ref_price: None,
            live_ref_price: None,
            raw_change: None,
            coefficient: None,
            price_cap: None,
            beta_shift: 0,
            cap_shift: 0,
            capped_change: None,
            target_price: None,
            order_price: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_coefficient(mut self, coefficient: f64) -> Self {
        self.coefficient = Some(coefficient);
        self
    }

    pub fn with_price_cap(mut self, cap: f64) -> Self {
        self.price_cap = Some(cap);
        self
    }

    pub fn with_shifts(mut self, beta_shift: i32, cap_shift: i32) -> Self {
        self.beta_shift = beta_shift;
        self.cap_shift = cap_shift;
        self
    }

    pub fn with_reference(mut self, last_ref_price: f64) -> Self {
        self.last_ref_price = Some(last_ref_price);
        self
    }

    pub fn with_target(mut self, target_price: f64) -> Self {
        self.target_price = Some(target_price);
        self
    }
}
