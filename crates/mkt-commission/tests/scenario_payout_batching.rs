//! Scenario: batching approved commissions into a payout.
//!
//! # Invariants under test
//! 1. Three approved commissions (80 + 40 + 30) → total 150.00,
//!    fee 1.50, net 148.50, three items, every member Paid with the
//!    payout number as its reference.
//! 2. Below-minimum totals are refused and nothing is claimed.
//! 3. Pending / cancelled / foreign commissions are never eligible.
//! 4. A plan is refused at claim time when a row moved after planning.
//! 5. Plans lock rows in commission-id order.

use chrono::Utc;
use mkt_commission::{
    calculate, plan_payout, CommissionError, CommissionStatus, PaymentConfirmed, PayoutPolicy,
    PayoutRequest, PayoutStatus, RateSource, ResolvedRates, SellerCommission,
    SellerCommissionSettings,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// An approved commission whose net equals `net` (10% / 0% on `net * 10`).
fn approved(seller: Uuid, net: Decimal) -> SellerCommission {
    let signal = PaymentConfirmed {
        order_id: Uuid::new_v4(),
        order_item_id: Uuid::new_v4(),
        seller_id: Some(seller),
        order_item_amount: net * dec!(10),
        cumulative_sales: None,
    };
    let rates = ResolvedRates {
        commission_rate: dec!(10),
        platform_fee_rate: dec!(0),
        source: RateSource::Default,
    };
    let b = calculate(signal.order_item_amount, &rates).unwrap();
    let mut c = SellerCommission::open(Uuid::new_v4(), &signal, &b, rates.source, Utc::now()).unwrap();
    c.approve(Utc::now()).unwrap();
    c
}

fn settings(seller: Uuid, minimum: Decimal) -> SellerCommissionSettings {
    SellerCommissionSettings::defaults_for(seller, minimum)
}

fn request(seller: Uuid, rows: &[SellerCommission]) -> PayoutRequest {
    PayoutRequest {
        seller_id: seller,
        commission_ids: rows.iter().map(|c| c.id).collect(),
    }
}

// ---------------------------------------------------------------------------
// 1. Happy path
// ---------------------------------------------------------------------------

#[test]
fn three_approved_commissions_become_one_payout() {
    let seller = Uuid::new_v4();
    let mut rows = vec![
        approved(seller, dec!(80)),
        approved(seller, dec!(40)),
        approved(seller, dec!(30)),
    ];

    let plan = plan_payout(
        &request(seller, &rows),
        &rows,
        &settings(seller, dec!(100)),
        &PayoutPolicy::default(),
    )
    .unwrap();
    assert_eq!(plan.total_amount, dec!(150.00));
    assert_eq!(plan.transaction_fee.to_string(), "1.50");
    assert_eq!(plan.net_amount, dec!(148.50));
    assert_eq!(plan.payment_method, "bank_transfer");

    // What a store does inside its claim transaction.
    let issued = plan.issue(Uuid::new_v4(), 7, Utc::now());
    assert_eq!(issued.payout.payout_number, "PAY-000007");
    assert_eq!(issued.payout.status, PayoutStatus::Pending);
    assert_eq!(issued.items.len(), 3);
    assert_eq!(
        issued.items.iter().map(|i| i.amount).sum::<Decimal>(),
        issued.payout.total_amount
    );

    for row in rows.iter_mut() {
        plan.verify_locked(row).unwrap();
        row.mark_paid(&issued.claim, Utc::now()).unwrap();
    }
    for row in &rows {
        assert_eq!(row.status, CommissionStatus::Paid);
        assert_eq!(row.payment_reference.as_deref(), Some("PAY-000007"));
        assert!(row.paid_at.is_some());
    }
}

// ---------------------------------------------------------------------------
// 2. Minimum payout
// ---------------------------------------------------------------------------

#[test]
fn below_minimum_is_refused_without_claiming() {
    let seller = Uuid::new_v4();
    let rows = vec![approved(seller, dec!(30)), approved(seller, dec!(20))];

    let err = plan_payout(
        &request(seller, &rows),
        &rows,
        &settings(seller, dec!(100)),
        &PayoutPolicy::default(),
    )
    .unwrap_err();
    match err {
        CommissionError::BelowMinimumPayout { total, minimum } => {
            assert_eq!(total, dec!(50.00));
            assert_eq!(minimum, dec!(100));
        }
        other => panic!("expected BelowMinimumPayout, got {other:?}"),
    }
    assert!(rows.iter().all(|c| c.status == CommissionStatus::Approved));
}

#[test]
fn total_exactly_at_minimum_is_allowed() {
    let seller = Uuid::new_v4();
    let rows = vec![approved(seller, dec!(60)), approved(seller, dec!(40))];
    let plan = plan_payout(
        &request(seller, &rows),
        &rows,
        &settings(seller, dec!(100)),
        &PayoutPolicy::default(),
    )
    .unwrap();
    assert_eq!(plan.total_amount, dec!(100));
}

// ---------------------------------------------------------------------------
// 3. Eligibility
// ---------------------------------------------------------------------------

#[test]
fn only_the_sellers_approved_rows_are_eligible() {
    let seller = Uuid::new_v4();
    let good = approved(seller, dec!(50));

    let mut cancelled = approved(seller, dec!(500));
    cancelled.cancel(Utc::now()).unwrap();
    let foreign = approved(Uuid::new_v4(), dec!(500));

    let rows = vec![good.clone(), cancelled, foreign];
    let plan = plan_payout(
        &request(seller, &rows),
        &rows,
        &settings(seller, dec!(0)),
        &PayoutPolicy::default(),
    )
    .unwrap();
    assert_eq!(plan.commission_ids().collect::<Vec<_>>(), vec![good.id]);
    assert_eq!(plan.total_amount, dec!(50));
}

#[test]
fn nothing_eligible_is_its_own_error() {
    let seller = Uuid::new_v4();
    let mut c = approved(seller, dec!(50));
    c.cancel(Utc::now()).unwrap();
    let rows = vec![c];
    let err = plan_payout(
        &request(seller, &rows),
        &rows,
        &settings(seller, dec!(0)),
        &PayoutPolicy::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CommissionError::NoEligibleCommissions { seller_id } if seller_id == seller));
}

#[test]
fn duplicate_and_unknown_ids_collapse() {
    let seller = Uuid::new_v4();
    let c = approved(seller, dec!(50));
    let req = PayoutRequest {
        seller_id: seller,
        commission_ids: vec![c.id, c.id, Uuid::new_v4()],
    };
    let plan = plan_payout(&req, &[c.clone(), c], &settings(seller, dec!(0)), &PayoutPolicy::default()).unwrap();
    assert_eq!(plan.claims.len(), 1);
    assert_eq!(plan.total_amount, dec!(50));
}

// ---------------------------------------------------------------------------
// 4. Version check at claim time
// ---------------------------------------------------------------------------

#[test]
fn row_cancelled_after_planning_is_a_conflict() {
    let seller = Uuid::new_v4();
    let rows = vec![approved(seller, dec!(80)), approved(seller, dec!(40))];
    let plan = plan_payout(
        &request(seller, &rows),
        &rows,
        &settings(seller, dec!(0)),
        &PayoutPolicy::default(),
    )
    .unwrap();

    let mut moved = rows[0].clone();
    moved.cancel(Utc::now()).unwrap();
    let err = plan.verify_locked(&moved).unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, CommissionError::ConcurrencyConflict(_)));
}

#[test]
fn row_claimed_by_another_payout_is_a_conflict() {
    let seller = Uuid::new_v4();
    let rows = vec![approved(seller, dec!(80))];
    let s = settings(seller, dec!(0));
    let p = PayoutPolicy::default();

    let first = plan_payout(&request(seller, &rows), &rows, &s, &p).unwrap();
    let second = plan_payout(&request(seller, &rows), &rows, &s, &p).unwrap();

    let mut row = rows[0].clone();
    let issued = first.issue(Uuid::new_v4(), 1, Utc::now());
    first.verify_locked(&row).unwrap();
    row.mark_paid(&issued.claim, Utc::now()).unwrap();

    assert!(second.verify_locked(&row).is_err());
}

// ---------------------------------------------------------------------------
// 5. Lock order
// ---------------------------------------------------------------------------

#[test]
fn claims_are_sorted_by_commission_id() {
    let seller = Uuid::new_v4();
    let rows: Vec<_> = (0..8).map(|i| approved(seller, Decimal::from(10 + i))).collect();
    let plan = plan_payout(
        &request(seller, &rows),
        &rows,
        &settings(seller, dec!(0)),
        &PayoutPolicy::default(),
    )
    .unwrap();
    let ids: Vec<Uuid> = plan.commission_ids().collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn transaction_fee_rounds_half_to_even() {
    // 0.50 * 1% = 0.005 → 0.00; 1.50 * 1% = 0.015 → 0.02
    let seller = Uuid::new_v4();
    let p = PayoutPolicy::default();
    let s = settings(seller, dec!(0));

    let a = vec![approved(seller, dec!(0.5))];
    assert_eq!(plan_payout(&request(seller, &a), &a, &s, &p).unwrap().transaction_fee, dec!(0.00));

    let b = vec![approved(seller, dec!(1.5))];
    assert_eq!(plan_payout(&request(seller, &b), &b, &s, &p).unwrap().transaction_fee, dec!(0.02));
}
