//! Scenario: commission arithmetic and rate selection for one order item.
//!
//! # Invariants under test
//! 1. 1000 at 10% / 2% → commission 100.00, fee 20.00, net 80.00.
//! 2. A seller override of 15% zeroes the platform fee.
//! 3. No matching tier → explicit default (10% / 2%), tagged `default`.
//! 4. `net = commission - fee` exactly; each figure is rounded once.
//! 5. An order item without a seller cannot open a ledger entry.
//!
//! All tests are pure; no IO, no DB, no network.

use chrono::Utc;
use mkt_commission::{
    calculate, resolve_rates, CommissionError, CommissionStatus, CommissionTier, DefaultRates,
    PaymentConfirmed, RateSource, SellerCommission, SellerCommissionSettings,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn tier(name: &str, min: Decimal, max: Decimal, rate: Decimal, fee: Decimal, prio: i32) -> CommissionTier {
    CommissionTier {
        id: Uuid::new_v4(),
        name: name.to_string(),
        min_sales: min,
        max_sales: max,
        commission_rate: rate,
        platform_fee_rate: fee,
        priority: prio,
        is_active: true,
    }
}

fn signal(seller: Option<Uuid>, amount: Decimal) -> PaymentConfirmed {
    PaymentConfirmed {
        order_id: Uuid::new_v4(),
        order_item_id: Uuid::new_v4(),
        seller_id: seller,
        order_item_amount: amount,
        cumulative_sales: None,
    }
}

// ---------------------------------------------------------------------------
// 1. Tier rate 10% / 2% on a 1000 order
// ---------------------------------------------------------------------------

#[test]
fn tier_rate_on_thousand_order() {
    let tiers = [tier("standard", dec!(0), dec!(50000), dec!(10), dec!(2), 1)];
    let rates = resolve_rates(None, dec!(0), &tiers, &DefaultRates::default()).unwrap();
    assert_eq!(rates.source, RateSource::Tier { name: "standard".into() });

    let b = calculate(dec!(1000), &rates).unwrap();
    assert_eq!(b.commission_amount.to_string(), "100.00");
    assert_eq!(b.platform_fee.to_string(), "20.00");
    assert_eq!(b.net_amount.to_string(), "80.00");
}

// ---------------------------------------------------------------------------
// 2. Custom seller rate
// ---------------------------------------------------------------------------

#[test]
fn custom_rate_zeroes_platform_fee() {
    let seller = Uuid::new_v4();
    let settings = SellerCommissionSettings {
        custom_commission_rate: Some(dec!(15)),
        use_custom_rate: true,
        ..SellerCommissionSettings::defaults_for(seller, dec!(0))
    };
    let tiers = [tier("standard", dec!(0), dec!(50000), dec!(10), dec!(2), 1)];

    let rates = resolve_rates(Some(&settings), dec!(0), &tiers, &DefaultRates::default()).unwrap();
    assert_eq!(rates.source, RateSource::Custom);
    assert_eq!(rates.platform_fee_rate, Decimal::ZERO);

    let b = calculate(dec!(1000), &rates).unwrap();
    assert_eq!(b.commission_amount, dec!(150.00));
    assert_eq!(b.platform_fee, dec!(0));
    assert_eq!(b.net_amount, dec!(150.00));
}

#[test]
fn custom_flag_without_rate_is_rejected_not_defaulted() {
    let settings = SellerCommissionSettings {
        use_custom_rate: true,
        ..SellerCommissionSettings::defaults_for(Uuid::new_v4(), dec!(0))
    };
    let err = resolve_rates(Some(&settings), dec!(0), &[], &DefaultRates::default()).unwrap_err();
    assert!(matches!(err, CommissionError::Validation(_)));
}

// ---------------------------------------------------------------------------
// 3. Default fallback is explicit
// ---------------------------------------------------------------------------

#[test]
fn no_matching_tier_falls_back_to_tagged_default() {
    let tiers = [tier("gold", dec!(100000), dec!(999999), dec!(5), dec!(1), 1)];
    let rates = resolve_rates(None, dec!(10), &tiers, &DefaultRates::default()).unwrap();
    assert_eq!(rates.commission_rate, dec!(10));
    assert_eq!(rates.platform_fee_rate, dec!(2));
    assert_eq!(rates.source, RateSource::Default);
    assert_eq!(rates.source.label(), "default");
}

#[test]
fn higher_sales_move_seller_into_better_tier() {
    let tiers = [
        tier("bronze", dec!(0), dec!(9999.99), dec!(12), dec!(2), 2),
        tier("silver", dec!(10000), dec!(49999.99), dec!(10), dec!(2), 2),
        tier("gold", dec!(50000), dec!(99999999), dec!(8), dec!(1), 2),
    ];
    let d = DefaultRates::default();
    let pick = |sales| resolve_rates(None, sales, &tiers, &d).unwrap().source.label();
    assert_eq!(pick(dec!(0)), "tier:bronze");
    assert_eq!(pick(dec!(10000)), "tier:silver");
    assert_eq!(pick(dec!(75000)), "tier:gold");
}

#[test]
fn lower_priority_number_wins_on_overlap() {
    let promo = tier("promo", dec!(0), dec!(1000), dec!(5), dec!(0), 0);
    let base = tier("base", dec!(0), dec!(1000000), dec!(10), dec!(2), 10);
    let d = DefaultRates::default();
    let got = resolve_rates(None, dec!(500), &[base.clone(), promo.clone()], &d).unwrap();
    assert_eq!(got.source.label(), "tier:promo");
    let got = resolve_rates(None, dec!(5000), &[promo, base], &d).unwrap();
    assert_eq!(got.source.label(), "tier:base");
}

// ---------------------------------------------------------------------------
// 5. Missing seller
// ---------------------------------------------------------------------------

#[test]
fn order_item_without_seller_is_a_business_error() {
    let s = signal(None, dec!(50));
    let rates = resolve_rates(None, dec!(0), &[], &DefaultRates::default()).unwrap();
    let b = calculate(s.order_item_amount, &rates).unwrap();
    let err = SellerCommission::open(Uuid::new_v4(), &s, &b, rates.source, Utc::now()).unwrap_err();
    assert!(matches!(err, CommissionError::MissingSeller { order_item_id } if order_item_id == s.order_item_id));
}

#[test]
fn opened_entry_is_pending_and_carries_rate_source() {
    let s = signal(Some(Uuid::new_v4()), dec!(250));
    let rates = resolve_rates(None, dec!(0), &[], &DefaultRates::default()).unwrap();
    let b = calculate(s.order_item_amount, &rates).unwrap();
    let c = SellerCommission::open(Uuid::new_v4(), &s, &b, rates.source.clone(), Utc::now()).unwrap();
    assert_eq!(c.status, CommissionStatus::Pending);
    assert_eq!(c.rate_source, RateSource::Default);
    assert_eq!(c.net_amount, dec!(20.00));
    assert_eq!(c.version, 0);
}

// ---------------------------------------------------------------------------
// 4. Arithmetic properties
// ---------------------------------------------------------------------------

fn cents() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000).prop_map(|c| Decimal::new(c, 2))
}

fn rate() -> impl Strategy<Value = Decimal> {
    // 0.00 .. 100.00 in basis points of a percent
    (0i64..=10_000).prop_map(|bp| Decimal::new(bp, 2))
}

proptest! {
    #[test]
    fn net_is_exact_difference_and_amounts_have_two_places(amount in cents(), c in rate(), f in rate()) {
        let rates = mkt_commission::ResolvedRates {
            commission_rate: c,
            platform_fee_rate: f,
            source: RateSource::Default,
        };
        let b = calculate(amount, &rates).unwrap();
        prop_assert_eq!(b.net_amount, b.commission_amount - b.platform_fee);
        prop_assert_eq!(b.commission_amount.scale(), 2);
        prop_assert_eq!(b.platform_fee.scale(), 2);
        prop_assert_eq!(b.commission_amount + (amount - b.commission_amount), amount);
    }

    #[test]
    fn single_rounding_is_within_half_a_cent(amount in cents(), c in rate()) {
        let rates = mkt_commission::ResolvedRates {
            commission_rate: c,
            platform_fee_rate: Decimal::ZERO,
            source: RateSource::Default,
        };
        let b = calculate(amount, &rates).unwrap();
        let exact = amount * c / Decimal::ONE_HUNDRED;
        prop_assert!((b.commission_amount - exact).abs() <= dec!(0.005));
    }

    #[test]
    fn recomputation_is_stable(amount in cents(), c in rate(), f in rate()) {
        let rates = mkt_commission::ResolvedRates {
            commission_rate: c,
            platform_fee_rate: f,
            source: RateSource::Default,
        };
        prop_assert_eq!(calculate(amount, &rates).unwrap(), calculate(amount, &rates).unwrap());
    }
}
