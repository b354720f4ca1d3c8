//! Commission ledger entry state machine.
//!
//! # Design
//!
//! Every mutation of a [`SellerCommission`] goes through one of the methods
//! in this module. Each method enforces two invariants:
//!
//! 1. **Legal transitions only.** Anything else returns
//!    [`CommissionError::InvalidStateTransition`] and leaves the entry
//!    untouched.
//! 2. **Idempotent repeats.** Approving an Approved entry, or cancelling a
//!    Cancelled one, returns [`Transition::Unchanged`] without bumping the
//!    version, so a retried operator action is harmless.
//!
//! `Approved → Paid` and `Paid → Approved` are reserved for payouts. They
//! require a [`ClaimToken`] / [`RollbackToken`], which only the payout code in
//! this crate can mint. Storage adapters can carry the tokens around but
//! cannot fabricate them.
//!
//! Methods are pure: callers pass `now`, no clock is read here.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::calculator::CommissionBreakdown;
use crate::error::{CommissionError, EntityKind};
use crate::types::{CommissionStatus, PaymentConfirmed, RateSource, SellerCommission};

/// Outcome of an idempotent transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
}

/// Result of `Record`: a duplicate order item is not an error for callers
/// that retry order-completion events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Created(SellerCommission),
    AlreadyExists(SellerCommission),
}

impl RecordOutcome {
    pub fn commission(&self) -> &SellerCommission {
        match self {
            RecordOutcome::Created(c) | RecordOutcome::AlreadyExists(c) => c,
        }
    }

    pub fn into_commission(self) -> SellerCommission {
        match self {
            RecordOutcome::Created(c) | RecordOutcome::AlreadyExists(c) => c,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, RecordOutcome::Created(_))
    }

    /// Strict form for callers that want duplicates to be an error.
    pub fn created_or_err(self) -> Result<SellerCommission, CommissionError> {
        match self {
            RecordOutcome::Created(c) => Ok(c),
            RecordOutcome::AlreadyExists(c) => Err(CommissionError::AlreadyExists {
                order_item_id: c.order_item_id,
                existing_id: c.id,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Capability tokens
// ---------------------------------------------------------------------------

/// Proof that a set of commissions is being claimed by a specific payout.
///
/// Minted only by [`PayoutPlan::issue`](crate::PayoutPlan::issue).
#[derive(Debug, Clone)]
pub struct ClaimToken {
    payout_number: String,
    commission_ids: BTreeSet<Uuid>,
}

impl ClaimToken {
    pub(crate) fn new(payout_number: String, commission_ids: BTreeSet<Uuid>) -> Self {
        Self {
            payout_number,
            commission_ids,
        }
    }

    pub fn payout_number(&self) -> &str {
        &self.payout_number
    }

    pub fn commission_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.commission_ids.iter()
    }
}

/// Proof that a payout failed and its members may be reverted.
///
/// Minted only by [`CommissionPayout::fail`](crate::types::CommissionPayout::fail).
#[derive(Debug, Clone)]
pub struct RollbackToken {
    payout_id: Uuid,
    payout_number: String,
    commission_ids: BTreeSet<Uuid>,
}

impl RollbackToken {
    pub(crate) fn new(payout_id: Uuid, payout_number: String, commission_ids: BTreeSet<Uuid>) -> Self {
        Self {
            payout_id,
            payout_number,
            commission_ids,
        }
    }

    pub fn payout_id(&self) -> Uuid {
        self.payout_id
    }

    pub fn payout_number(&self) -> &str {
        &self.payout_number
    }

    pub fn commission_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.commission_ids.iter()
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

impl SellerCommission {
    /// Build a new `Pending` entry from a payment-confirmed signal.
    ///
    /// Fails with [`CommissionError::MissingSeller`] when the order item has
    /// no seller, and with `Validation` when the breakdown does not belong to
    /// the signal's amount.
    pub fn open(
        id: Uuid,
        signal: &PaymentConfirmed,
        breakdown: &CommissionBreakdown,
        rate_source: RateSource,
        now: DateTime<Utc>,
    ) -> Result<Self, CommissionError> {
        let seller_id = signal.seller_id.ok_or(CommissionError::MissingSeller {
            order_item_id: signal.order_item_id,
        })?;
        if crate::money::round_money(signal.order_item_amount) != breakdown.order_amount {
            return Err(CommissionError::Validation(format!(
                "breakdown amount {} does not match order item amount {}",
                breakdown.order_amount, signal.order_item_amount
            )));
        }

        Ok(Self {
            id,
            seller_id,
            order_id: signal.order_id,
            order_item_id: signal.order_item_id,
            order_amount: breakdown.order_amount,
            commission_rate: breakdown.commission_rate,
            platform_fee_rate: breakdown.platform_fee_rate,
            rate_source,
            commission_amount: breakdown.commission_amount,
            platform_fee: breakdown.platform_fee,
            net_amount: breakdown.net_amount,
            status: CommissionStatus::Pending,
            approved_at: None,
            paid_at: None,
            cancelled_at: None,
            payment_reference: None,
            created_at: now,
            version: 0,
        })
    }

    /// Pending → Approved. Repeat on Approved is a no-op.
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<Transition, CommissionError> {
        match self.status {
            CommissionStatus::Pending => {
                self.status = CommissionStatus::Approved;
                self.approved_at = Some(now);
                self.version += 1;
                Ok(Transition::Applied)
            }
            CommissionStatus::Approved => Ok(Transition::Unchanged),
            _ => Err(self.illegal("approve")),
        }
    }

    /// Pending | Approved → Cancelled. Repeat on Cancelled is a no-op.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<Transition, CommissionError> {
        match self.status {
            CommissionStatus::Pending | CommissionStatus::Approved => {
                self.status = CommissionStatus::Cancelled;
                self.cancelled_at = Some(now);
                self.version += 1;
                Ok(Transition::Applied)
            }
            CommissionStatus::Cancelled => Ok(Transition::Unchanged),
            CommissionStatus::Paid => Err(self.illegal("cancel")),
        }
    }

    /// Approved → Paid, stamped with the claiming payout's number.
    pub fn mark_paid(&mut self, claim: &ClaimToken, now: DateTime<Utc>) -> Result<(), CommissionError> {
        if !claim.commission_ids.contains(&self.id) {
            return Err(CommissionError::Validation(format!(
                "commission {} is not part of claim {}",
                self.id, claim.payout_number
            )));
        }
        match self.status {
            CommissionStatus::Approved => {
                self.status = CommissionStatus::Paid;
                self.paid_at = Some(now);
                self.payment_reference = Some(claim.payout_number.clone());
                self.version += 1;
                Ok(())
            }
            _ => Err(self.illegal("mark_paid")),
        }
    }

    /// Paid → Approved. Compensation for a failed payout; clears the payment
    /// stamp so the entry can be claimed again.
    pub fn revert_to_approved(&mut self, rollback: &RollbackToken) -> Result<(), CommissionError> {
        if !rollback.commission_ids.contains(&self.id) {
            return Err(CommissionError::Validation(format!(
                "commission {} is not a member of payout {}",
                self.id, rollback.payout_number
            )));
        }
        if self.status != CommissionStatus::Paid
            || self.payment_reference.as_deref() != Some(rollback.payout_number.as_str())
        {
            return Err(self.illegal("revert_to_approved"));
        }
        self.status = CommissionStatus::Approved;
        self.paid_at = None;
        self.payment_reference = None;
        self.version += 1;
        Ok(())
    }

    fn illegal(&self, action: &'static str) -> CommissionError {
        CommissionError::InvalidStateTransition {
            kind: EntityKind::Commission,
            id: self.id,
            from: self.status.as_str(),
            action,
        }
    }
}

/// The live (non-cancelled) entry for `order_item_id`, if one exists.
///
/// Used by in-process stores to enforce at-most-once recording.
pub fn find_live_for_item(
    entries: impl IntoIterator<Item = impl std::borrow::Borrow<SellerCommission>>,
    order_item_id: Uuid,
) -> Option<SellerCommission> {
    entries.into_iter().find_map(|c| {
        let c = c.borrow();
        (c.order_item_id == order_item_id && c.status != CommissionStatus::Cancelled)
            .then(|| c.clone())
    })
}
