//! Persistence seam for the commission engine.
//!
//! # Contract
//!
//! Every mutating method is one atomic unit: either all of its writes land
//! or none do. Implementations apply state changes through the domain
//! state machines in `mkt-commission` (never by assigning `status`
//! directly), so illegal transitions surface as
//! `CommissionError::InvalidStateTransition` no matter which store is used.
//!
//! - `record_commission` is idempotent on `order_item_id` among
//!   non-cancelled rows and returns the existing row on a duplicate.
//! - `claim_payout` locks every planned row, re-checks it with
//!   `PayoutPlan::verify_locked`, allocates the next payout number and
//!   marks every member Paid. Any mismatch aborts with
//!   `ConcurrencyConflict` and writes nothing.
//! - `fail_payout` moves the payout to Failed and reverts every member to
//!   Approved in the same unit.

use chrono::{DateTime, Utc};
use mkt_commission::{
    CommissionError, CommissionPayout, CommissionPayoutItem, CommissionTier, PayoutCompleted,
    PayoutPlan, RecordOutcome, SellerCommission, SellerCommissionSettings, Transition,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, CommissionError>;

/// A payout together with its member items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub payout: CommissionPayout,
    pub items: Vec<CommissionPayoutItem>,
}

/// Everything the balance projection needs for one seller, read at one
/// point in time.
#[derive(Debug, Clone, Default)]
pub struct SellerSnapshot {
    pub settings: Option<SellerCommissionSettings>,
    pub commissions: Vec<SellerCommission>,
    pub payouts: Vec<CommissionPayout>,
}

#[async_trait::async_trait]
pub trait CommissionStore: Send + Sync {
    /// Short backend name for logs (`memory`, `postgres`).
    fn backend(&self) -> &'static str;

    // --- policy inputs (read-only) ---------------------------------------

    async fn load_settings(&self, seller_id: Uuid) -> StoreResult<Option<SellerCommissionSettings>>;

    async fn active_tiers(&self) -> StoreResult<Vec<CommissionTier>>;

    /// Σ `order_amount` of the seller's non-cancelled commissions.
    async fn cumulative_sales(&self, seller_id: Uuid) -> StoreResult<Decimal>;

    // --- commissions -----------------------------------------------------

    async fn record_commission(&self, commission: SellerCommission) -> StoreResult<RecordOutcome>;

    async fn fetch_commission(&self, id: Uuid) -> StoreResult<SellerCommission>;

    /// Rows for the ids that exist; unknown ids are skipped.
    async fn commissions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<SellerCommission>>;

    async fn approve_commission(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(SellerCommission, Transition)>;

    async fn cancel_commission(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(SellerCommission, Transition)>;

    // --- payouts ---------------------------------------------------------

    async fn claim_payout(&self, plan: &PayoutPlan, now: DateTime<Utc>) -> StoreResult<PayoutRecord>;

    async fn fetch_payout(&self, id: Uuid) -> StoreResult<PayoutRecord>;

    async fn process_payout(
        &self,
        id: Uuid,
        transaction_reference: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<CommissionPayout>;

    async fn complete_payout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(CommissionPayout, PayoutCompleted)>;

    /// Returns the failed payout and the reverted member commissions.
    async fn fail_payout(
        &self,
        id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<(CommissionPayout, Vec<SellerCommission>)>;

    // --- projection ------------------------------------------------------

    async fn seller_snapshot(&self, seller_id: Uuid) -> StoreResult<SellerSnapshot>;
}
