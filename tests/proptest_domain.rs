//! Property-Based Tests - Adjustment and Merge Invariants
//!
//! Uses proptest to verify mathematical properties of the adjustment
//! strategies and the price-record merge across random inputs.

use proptest::prelude::*;

use price_hub::domain::adjustment::{apply_cap, Direction, DEFAULT_PRICE_CAP};
use price_hub::domain::price::{PriceRecord, PriceUpdate};
use price_hub::domain::route::{AdjustmentStrategy, RouteStatus};

fn route(strategy: AdjustmentStrategy, last_ref: f64, target: f64) -> RouteStatus {
    RouteStatus::new("p", "SEC", "REF", strategy)
        .with_reference(last_ref)
        .with_target(target)
}

// ---- Delta Strategy Properties ----

proptest! {
    /// The delta coefficient appears on both sides of the ratio, so it
    /// never changes the resulting target.
    #[test]
    fn delta_coefficient_is_inert(
        last_ref in 1.0f64..10_000.0,
        live in 1.0f64..10_000.0,
        target in 0.01f64..1_000.0,
        delta in prop_oneof![Just(0.0f64), 0.01f64..50.0],
    ) {
        let base = AdjustmentStrategy::Delta
            .compute(&route(AdjustmentStrategy::Delta, last_ref, target), live)
            .unwrap();
        let scaled = AdjustmentStrategy::Delta
            .compute(
                &route(AdjustmentStrategy::Delta, last_ref, target).with_coefficient(delta),
                live,
            )
            .unwrap();

        prop_assert!((base.capped_change - scaled.capped_change).abs() < 1e-9);
        prop_assert!((base.target_price - scaled.target_price).abs() < 1e-6 * target.max(1.0));
    }
}

// ---- Cap Properties ----

proptest! {
    /// With both cap directions enabled, the change never exceeds the cap.
    #[test]
    fn two_sided_cap_bounds_change(
        change in -1.0f64..1.0,
        cap in 0.001f64..0.5,
    ) {
        let direction = if change >= 0.0 { Direction::Up } else { Direction::Down };
        let capped = apply_cap(change, cap, 0, direction);
        prop_assert!(capped.abs() <= cap + 1e-12);
        prop_assert!(capped.abs() <= change.abs() + 1e-12);
    }

    /// An up-only cap shift never touches a down move.
    #[test]
    fn up_only_cap_leaves_down_moves(
        change in -1.0f64..-0.0001,
        cap in 0.001f64..0.5,
    ) {
        prop_assert_eq!(apply_cap(change, cap, 1, Direction::Down), change);
    }

    /// Beta routes without a configured cap use the default.
    #[test]
    fn beta_default_cap_applies(
        last_ref in 10.0f64..1_000.0,
        jump in 0.05f64..2.0,
        beta in 1.0f64..3.0,
    ) {
        let live = last_ref * (1.0 + jump);
        let r = route(AdjustmentStrategy::Beta, last_ref, 100.0).with_coefficient(beta);
        let adj = AdjustmentStrategy::Beta.compute(&r, live).unwrap();
        prop_assert!((adj.capped_change - DEFAULT_PRICE_CAP).abs() < 1e-12);
        prop_assert!((adj.target_price - 100.0 * (1.0 + DEFAULT_PRICE_CAP)).abs() < 1e-9);
    }
}

// ---- Absolute Strategy Properties ----

proptest! {
    /// Without a cap the absolute strategy never clips the change and
    /// always targets live + offset.
    #[test]
    fn absolute_without_cap_never_clips(
        last_ref in 1.0f64..1_000.0,
        live in 1.0f64..1_000.0,
        offset in -0.5f64..50.0,
    ) {
        let r = route(AdjustmentStrategy::Absolute, last_ref, 1.0).with_coefficient(offset);
        let adj = AdjustmentStrategy::Absolute.compute(&r, live).unwrap();
        prop_assert_eq!(adj.capped_change, adj.raw_change);
        prop_assert!((adj.target_price - (live + offset)).abs() < 1e-9);
    }
}

// ---- Merge Properties ----

proptest! {
    /// Fields an update does not carry keep their previous value.
    #[test]
    fn merge_keeps_unsupplied_fields(
        bid in 0.01f64..1_000.0,
        ask in 0.01f64..1_000.0,
        last in 0.01f64..1_000.0,
    ) {
        let mut record = PriceRecord::new("SEC");
        record.apply(&PriceUpdate { bid_price: Some(bid), ask_price: Some(ask), ..Default::default() });
        record.apply(&PriceUpdate { last_price: Some(last), ..Default::default() });

        prop_assert_eq!(record.bid_price, Some(bid));
        prop_assert_eq!(record.ask_price, Some(ask));
        prop_assert_eq!(record.last_price, Some(last));
    }
}
