//! Reference-index order-price adjustment.
//!
//! Pure functions over a `RouteStatus` and a fresh reference price. The
//! strategy tag stored on the route selects the formula once; direction and
//! cap rules are shared by all three strategies.
//!
//! Unset numeric inputs read as zero. A zero reference price or any other
//! input that makes the result non-finite produces
//! [`AdjustmentError::InvalidAdjustment`] instead of a poisoned target.

use chrono::Utc;
use thiserror::Error;

use super::route::{AdjustmentStrategy, RouteStatus};

/// Cap applied by the beta and delta strategies when none is configured.
pub const DEFAULT_PRICE_CAP: f64 = 0.03;

/// Errors raised while computing an adjustment.
#[derive(Debug, Error, PartialEq)]
pub enum AdjustmentError {
    /// The computation produced NaN or an infinity.
    #[error("invalid adjustment for {strategy} route: {reason}")]
    InvalidAdjustment {
        strategy: AdjustmentStrategy,
        reason: String,
    },
}

/// Direction of a reference move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn of(change: f64) -> Self {
        if change >= 0.0 { Self::Up } else { Self::Down }
    }

    /// Whether a directional shift indicator admits this direction.
    pub fn permitted_by(self, shift: i32) -> bool {
        match self {
            _ if shift == 0 => true,
            Self::Up => shift > 0,
            Self::Down => shift < 0,
        }
    }
}

/// Result of one adjustment, before it is written back to the route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub live_ref_price: f64,
    pub direction: Direction,
    pub raw_change: f64,
    pub adjusted_change: f64,
    pub capped_change: f64,
    pub target_price: f64,
}

impl Adjustment {
    /// Write the adjustment into the route and advance its reference baseline.
    pub fn apply_to(&self, route: &mut RouteStatus) {
        route.live_ref_price = Some(self.live_ref_price);
        route.last_ref_price = Some(self.live_ref_price);
        route.raw_change = Some(self.raw_change);
        route.capped_change = Some(self.capped_change);
        route.target_price = Some(self.target_price);
        route.updated_at = Utc::now();
    }
}

impl AdjustmentStrategy {
    /// Compute the adjustment for `route` given a live reference price.
    pub fn compute(
        self,
        route: &RouteStatus,
        live: f64,
    ) -> Result<Adjustment, AdjustmentError> {
        let last_ref = route.last_ref_price.unwrap_or(0.0);
        let coefficient = route.coefficient.unwrap_or(0.0);
        let previous_target = route.target_price.unwrap_or(0.0);

        let adjustment = match self {
            Self::Beta => {
                let raw = live / last_ref - 1.0;
                let direction = Direction::of(raw);
                let beta = if coefficient == 0.0 { 1.0 } else { coefficient };
                let adjusted = if direction.permitted_by(route.beta_shift) {
                    raw * beta
                } else {
                    raw
                };
                let cap = configured_cap(route).unwrap_or(DEFAULT_PRICE_CAP);
                let capped = apply_cap(adjusted, cap, route.cap_shift, direction);
                Adjustment {
                    live_ref_price: live,
                    direction,
                    raw_change: raw,
                    adjusted_change: adjusted,
                    capped_change: capped,
                    target_price: previous_target * (1.0 + capped),
                }
            }
            Self::Delta => {
                // Delta appears on both sides of the ratio and cancels out.
                let delta = if coefficient == 0.0 { 1.0 } else { coefficient };
                let raw = (live * delta) / (last_ref * delta) - 1.0;
                let direction = Direction::of(raw);
                let cap = configured_cap(route).unwrap_or(DEFAULT_PRICE_CAP);
                let capped = apply_cap(raw, cap, route.cap_shift, direction);
                Adjustment {
                    live_ref_price: live,
                    direction,
                    raw_change: raw,
                    adjusted_change: raw,
                    capped_change: capped,
                    target_price: previous_target * (1.0 + capped),
                }
            }
            Self::Absolute => {
                let offset = coefficient;
                let raw = (live + offset) / (last_ref + offset) - 1.0;
                let direction = Direction::of(raw);
                let capped = match configured_cap(route) {
                    Some(cap) => apply_cap(raw, cap, route.cap_shift, direction),
                    None => raw,
                };
                Adjustment {
                    live_ref_price: live,
                    direction,
                    raw_change: raw,
                    adjusted_change: raw,
                    capped_change: capped,
                    target_price: live + offset,
                }
            }
        };

        ensure_finite(self, &adjustment)?;
        Ok(adjustment)
    }
}

/// Cap configured on the route; zero counts as unset.
fn configured_cap(route: &RouteStatus) -> Option<f64> {
    route.price_cap.filter(|cap| *cap != 0.0).map(f64::abs)
}

/// Clip `change` to `cap` in the direction the cap-shift indicator allows.
pub fn apply_cap(change: f64, cap: f64, cap_shift: i32, direction: Direction) -> f64 {
    match direction {
        Direction::Up if cap_shift >= 0 && change > cap => cap,
        Direction::Down if cap_shift <= 0 && change < -cap => -cap,
        _ => change,
    }
}

fn ensure_finite(
    strategy: AdjustmentStrategy,
    adjustment: &Adjustment,
) -> Result<(), AdjustmentError> {
    let fields = [
        ("raw change", adjustment.raw_change),
        ("capped change", adjustment.capped_change),
        ("target price", adjustment.target_price),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(AdjustmentError::InvalidAdjustment {
                strategy,
                reason: format!("{name} is {value}"),
            });
        }
    }
    Ok(())
}
