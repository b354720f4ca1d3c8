//! Scenario: concurrent payout requests over overlapping commissions.
//!
//! # Invariant under test
//! A commission is claimed by at most one payout. When two requests both
//! name commission C:
//! - exactly one payout contains C;
//! - the other request either succeeds with its remaining commissions or,
//!   when C was its only member, fails with `ConcurrencyConflict`.
//!
//! The gated store holds both claims until both requests have planned, so
//! the race is forced every run instead of depending on scheduling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mkt_commission::{
    CommissionError, CommissionPayout, CommissionStatus, CommissionTier, PaymentConfirmed,
    PayoutCompleted, PayoutPlan, PayoutRequest, RecordOutcome, SellerCommission,
    SellerCommissionSettings, Transition,
};
use mkt_engine::{
    CommissionEngine, CommissionStore, EnginePolicy, InMemoryStore, PayoutRecord, SellerSnapshot,
    StoreResult,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Barrier;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Gated store: the first `gate_n` claims wait for each other
// ---------------------------------------------------------------------------

struct GatedStore {
    inner: InMemoryStore,
    barrier: Barrier,
    gate_n: usize,
    claims: AtomicUsize,
}

impl GatedStore {
    fn new(gate_n: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            barrier: Barrier::new(gate_n),
            gate_n,
            claims: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl CommissionStore for GatedStore {
    fn backend(&self) -> &'static str {
        "gated"
    }
    async fn load_settings(&self, seller_id: Uuid) -> StoreResult<Option<SellerCommissionSettings>> {
        self.inner.load_settings(seller_id).await
    }
    async fn active_tiers(&self) -> StoreResult<Vec<CommissionTier>> {
        self.inner.active_tiers().await
    }
    async fn cumulative_sales(&self, seller_id: Uuid) -> StoreResult<Decimal> {
        self.inner.cumulative_sales(seller_id).await
    }
    async fn record_commission(&self, c: SellerCommission) -> StoreResult<RecordOutcome> {
        self.inner.record_commission(c).await
    }
    async fn fetch_commission(&self, id: Uuid) -> StoreResult<SellerCommission> {
        self.inner.fetch_commission(id).await
    }
    async fn commissions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<SellerCommission>> {
        self.inner.commissions_by_ids(ids).await
    }
    async fn approve_commission(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<(SellerCommission, Transition)> {
        self.inner.approve_commission(id, now).await
    }
    async fn cancel_commission(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<(SellerCommission, Transition)> {
        self.inner.cancel_commission(id, now).await
    }
    async fn claim_payout(&self, plan: &PayoutPlan, now: DateTime<Utc>) -> StoreResult<PayoutRecord> {
        if self.claims.fetch_add(1, Ordering::SeqCst) < self.gate_n {
            self.barrier.wait().await;
        }
        self.inner.claim_payout(plan, now).await
    }
    async fn fetch_payout(&self, id: Uuid) -> StoreResult<PayoutRecord> {
        self.inner.fetch_payout(id).await
    }
    async fn process_payout(&self, id: Uuid, r: &str, now: DateTime<Utc>) -> StoreResult<CommissionPayout> {
        self.inner.process_payout(id, r, now).await
    }
    async fn complete_payout(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<(CommissionPayout, PayoutCompleted)> {
        self.inner.complete_payout(id, now).await
    }
    async fn fail_payout(
        &self,
        id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<(CommissionPayout, Vec<SellerCommission>)> {
        self.inner.fail_payout(id, reason, now).await
    }
    async fn seller_snapshot(&self, seller_id: Uuid) -> StoreResult<SellerSnapshot> {
        self.inner.seller_snapshot(seller_id).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn approved(engine: &CommissionEngine, seller: Uuid, amount: Decimal) -> Uuid {
    let signal = PaymentConfirmed {
        order_id: Uuid::new_v4(),
        order_item_id: Uuid::new_v4(),
        seller_id: Some(seller),
        order_item_amount: amount,
        cumulative_sales: None,
    };
    let c = engine.on_payment_confirmed(&signal).await.unwrap().into_commission();
    engine.approve(c.id).await.unwrap();
    c.id
}

fn engine_on(store: Arc<GatedStore>) -> Arc<CommissionEngine> {
    Arc::new(CommissionEngine::new(store, EnginePolicy::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_commission_is_claimed_once_and_remainder_is_paid() {
    let store = Arc::new(GatedStore::new(2));
    let engine = engine_on(store.clone());
    let seller = Uuid::new_v4();

    let a = approved(&engine, seller, dec!(1000)).await;
    let b = approved(&engine, seller, dec!(500)).await;
    let c = approved(&engine, seller, dec!(250)).await;

    let e1 = engine.clone();
    let e2 = engine.clone();
    let r1 = PayoutRequest { seller_id: seller, commission_ids: vec![a, c] };
    let r2 = PayoutRequest { seller_id: seller, commission_ids: vec![b, c] };
    let (x, y) = tokio::join!(
        tokio::spawn(async move { e1.request_payout(&r1).await }),
        tokio::spawn(async move { e2.request_payout(&r2).await }),
    );
    let x = x.unwrap().unwrap();
    let y = y.unwrap().unwrap();

    let holders = [&x, &y]
        .iter()
        .filter(|r| r.items.iter().any(|i| i.commission_id == c))
        .count();
    assert_eq!(holders, 1, "C must belong to exactly one payout");
    assert_ne!(x.payout.payout_number, y.payout.payout_number);

    for id in [a, b, c] {
        assert_eq!(engine.commission(id).await.unwrap().status, CommissionStatus::Paid);
    }
    engine.seller_balance(seller).await.unwrap().reconcile().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sole_shared_commission_loser_gets_concurrency_conflict() {
    let store = Arc::new(GatedStore::new(2));
    let engine = engine_on(store.clone());
    let seller = Uuid::new_v4();
    let c = approved(&engine, seller, dec!(1000)).await;

    let e1 = engine.clone();
    let e2 = engine.clone();
    let req = PayoutRequest { seller_id: seller, commission_ids: vec![c] };
    let r1 = req.clone();
    let (x, y) = tokio::join!(
        tokio::spawn(async move { e1.request_payout(&r1).await }),
        tokio::spawn(async move { e2.request_payout(&req).await }),
    );
    let results = [x.unwrap(), y.unwrap()];

    let won = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(won, 1);
    let lost = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(
        matches!(lost, CommissionError::ConcurrencyConflict(_)),
        "loser must see ConcurrencyConflict, got {lost:?}"
    );
    assert!(lost.is_retryable());
    assert_eq!(store.inner.payout_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_racing_requests_never_double_claim() {
    // Gate disabled: free-running race.
    let store = Arc::new(GatedStore::new(0));
    let engine = engine_on(store.clone());
    let seller = Uuid::new_v4();

    let mut ids = Vec::new();
    for i in 0..12 {
        ids.push(approved(&engine, seller, Decimal::from(100 + i)).await);
    }

    let mut handles = Vec::new();
    for k in 0..16usize {
        let e = engine.clone();
        // overlapping windows of four
        let window: Vec<Uuid> = (0..4).map(|j| ids[(k + j) % ids.len()]).collect();
        handles.push(tokio::spawn(async move {
            e.request_payout(&PayoutRequest { seller_id: seller, commission_ids: window }).await
        }));
    }

    let mut claimed = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Ok(rec) => claimed.extend(rec.items.iter().map(|i| i.commission_id)),
            Err(CommissionError::ConcurrencyConflict(_)) | Err(CommissionError::NoEligibleCommissions { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let total = claimed.len();
    claimed.sort();
    claimed.dedup();
    assert_eq!(claimed.len(), total, "a commission appeared in two payouts");
    engine.seller_balance(seller).await.unwrap().reconcile().unwrap();
}
