//! In-process [`CommissionStore`].
//!
//! One `tokio::sync::Mutex` guards the whole book, so every trait method is
//! trivially atomic: it validates against the locked state, applies the
//! domain transitions to clones, and only then writes the clones back.
//! An error anywhere leaves the book untouched.
//!
//! Used by engine tests, the daemon's `MKT_STORE=memory` mode and local
//! demos. Not durable.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use mkt_commission::{
    find_live_for_item, CommissionError, CommissionPayout, CommissionPayoutItem, CommissionStatus,
    CommissionTier, EntityKind, PayoutCompleted, PayoutPlan, RecordOutcome, SellerCommission,
    SellerCommissionSettings, Transition,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::{CommissionStore, PayoutRecord, SellerSnapshot, StoreResult};

#[derive(Default)]
struct Book {
    settings: HashMap<Uuid, SellerCommissionSettings>,
    tiers: BTreeMap<Uuid, CommissionTier>,
    commissions: BTreeMap<Uuid, SellerCommission>,
    payouts: BTreeMap<Uuid, CommissionPayout>,
    items: Vec<CommissionPayoutItem>,
    /// Last allocated payout sequence value.
    payout_seq: i64,
}

impl Book {
    fn commission(&self, id: Uuid) -> StoreResult<&SellerCommission> {
        self.commissions
            .get(&id)
            .ok_or_else(|| CommissionError::not_found(EntityKind::Commission, id))
    }

    fn payout(&self, id: Uuid) -> StoreResult<&CommissionPayout> {
        self.payouts
            .get(&id)
            .ok_or_else(|| CommissionError::not_found(EntityKind::Payout, id))
    }

    fn items_of(&self, payout_id: Uuid) -> Vec<CommissionPayoutItem> {
        let mut items: Vec<_> = self
            .items
            .iter()
            .filter(|i| i.payout_id == payout_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.commission_id);
        items
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    book: Mutex<Book>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_settings(&self, settings: SellerCommissionSettings) -> StoreResult<()> {
        settings.validate()?;
        self.book.lock().await.settings.insert(settings.seller_id, settings);
        Ok(())
    }

    pub async fn upsert_tier(&self, tier: CommissionTier) -> StoreResult<()> {
        tier.validate()?;
        self.book.lock().await.tiers.insert(tier.id, tier);
        Ok(())
    }

    /// Number of payouts ever issued. Test helper.
    pub async fn payout_count(&self) -> usize {
        self.book.lock().await.payouts.len()
    }
}

#[async_trait::async_trait]
impl CommissionStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn load_settings(&self, seller_id: Uuid) -> StoreResult<Option<SellerCommissionSettings>> {
        Ok(self.book.lock().await.settings.get(&seller_id).cloned())
    }

    async fn active_tiers(&self) -> StoreResult<Vec<CommissionTier>> {
        let book = self.book.lock().await;
        Ok(book.tiers.values().filter(|t| t.is_active).cloned().collect())
    }

    async fn cumulative_sales(&self, seller_id: Uuid) -> StoreResult<Decimal> {
        let book = self.book.lock().await;
        Ok(book
            .commissions
            .values()
            .filter(|c| c.seller_id == seller_id && c.status != CommissionStatus::Cancelled)
            .map(|c| c.order_amount)
            .sum())
    }

    async fn record_commission(&self, commission: SellerCommission) -> StoreResult<RecordOutcome> {
        let mut book = self.book.lock().await;
        if let Some(existing) = find_live_for_item(book.commissions.values(), commission.order_item_id) {
            return Ok(RecordOutcome::AlreadyExists(existing));
        }
        if book.commissions.contains_key(&commission.id) {
            return Err(CommissionError::Validation(format!(
                "commission id {} already in use",
                commission.id
            )));
        }
        book.commissions.insert(commission.id, commission.clone());
        Ok(RecordOutcome::Created(commission))
    }

    async fn fetch_commission(&self, id: Uuid) -> StoreResult<SellerCommission> {
        self.book.lock().await.commission(id).cloned()
    }

    async fn commissions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<SellerCommission>> {
        let book = self.book.lock().await;
        Ok(ids.iter().filter_map(|id| book.commissions.get(id).cloned()).collect())
    }

    async fn approve_commission(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(SellerCommission, Transition)> {
        let mut book = self.book.lock().await;
        let mut row = book.commission(id)?.clone();
        let t = row.approve(now)?;
        book.commissions.insert(id, row.clone());
        Ok((row, t))
    }

    async fn cancel_commission(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(SellerCommission, Transition)> {
        let mut book = self.book.lock().await;
        let mut row = book.commission(id)?.clone();
        let t = row.cancel(now)?;
        book.commissions.insert(id, row.clone());
        Ok((row, t))
    }

    async fn claim_payout(&self, plan: &PayoutPlan, now: DateTime<Utc>) -> StoreResult<PayoutRecord> {
        let mut book = self.book.lock().await;

        let mut rows = Vec::with_capacity(plan.claims.len());
        for id in plan.commission_ids() {
            let row = book.commission(id)?;
            plan.verify_locked(row)?;
            rows.push(row.clone());
        }

        let issued = plan.issue(Uuid::new_v4(), book.payout_seq + 1, now);
        for row in rows.iter_mut() {
            row.mark_paid(&issued.claim, now)?;
        }

        book.payout_seq += 1;
        for row in rows {
            book.commissions.insert(row.id, row);
        }
        book.payouts.insert(issued.payout.id, issued.payout.clone());
        book.items.extend(issued.items.iter().cloned());

        Ok(PayoutRecord {
            payout: issued.payout,
            items: issued.items,
        })
    }

    async fn fetch_payout(&self, id: Uuid) -> StoreResult<PayoutRecord> {
        let book = self.book.lock().await;
        let payout = book.payout(id)?.clone();
        Ok(PayoutRecord {
            items: book.items_of(id),
            payout,
        })
    }

    async fn process_payout(
        &self,
        id: Uuid,
        transaction_reference: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<CommissionPayout> {
        let mut book = self.book.lock().await;
        let mut payout = book.payout(id)?.clone();
        payout.process(transaction_reference, now)?;
        book.payouts.insert(id, payout.clone());
        Ok(payout)
    }

    async fn complete_payout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(CommissionPayout, PayoutCompleted)> {
        let mut book = self.book.lock().await;
        let mut payout = book.payout(id)?.clone();
        let event = payout.complete(now)?;
        book.payouts.insert(id, payout.clone());
        Ok((payout, event))
    }

    async fn fail_payout(
        &self,
        id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<(CommissionPayout, Vec<SellerCommission>)> {
        let mut book = self.book.lock().await;
        let mut payout = book.payout(id)?.clone();
        let members = book.items_of(id);
        let rollback = payout.fail(reason, &members, now)?;

        let mut reverted = Vec::with_capacity(members.len());
        for id in rollback.commission_ids() {
            let mut row = book.commission(*id)?.clone();
            row.revert_to_approved(&rollback)?;
            reverted.push(row);
        }

        book.payouts.insert(payout.id, payout.clone());
        for row in &reverted {
            book.commissions.insert(row.id, row.clone());
        }
        Ok((payout, reverted))
    }

    async fn seller_snapshot(&self, seller_id: Uuid) -> StoreResult<SellerSnapshot> {
        let book = self.book.lock().await;
        Ok(SellerSnapshot {
            settings: book.settings.get(&seller_id).cloned(),
            commissions: book
                .commissions
                .values()
                .filter(|c| c.seller_id == seller_id)
                .cloned()
                .collect(),
            payouts: book
                .payouts
                .values()
                .filter(|p| p.seller_id == seller_id)
                .cloned()
                .collect(),
        })
    }
}
