//! Payout batching: turn a caller-selected set of commissions into a
//! claimable payout plan.
//!
//! Planning is pure. It reads a snapshot of candidate commissions and the
//! seller's settings and either rejects the request with a clear reason or
//! produces a [`PayoutPlan`]. The plan records the `version` of every
//! commission it saw, and a store must refuse to apply it if any of those
//! versions moved in the meantime. That check is what makes two concurrent
//! payout requests unable to claim the same commission.
//!
//! Applying a plan is all-or-nothing and happens in the store:
//! allocate a payout number, [`PayoutPlan::issue`] the payout, its items
//! and the [`ClaimToken`], then `mark_paid` every member.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CommissionError;
use crate::ledger::ClaimToken;
use crate::money::{ensure_rate, percent_of, round_money, sum_money};
use crate::types::{
    CommissionPayout, CommissionPayoutItem, CommissionStatus, PayoutStatus, SellerCommission,
    SellerCommissionSettings,
};

/// Prefix of every payout number.
pub const PAYOUT_NUMBER_PREFIX: &str = "PAY-";

/// `PAY-` followed by the sequence zero-padded to six digits.
pub fn format_payout_number(sequence: i64) -> String {
    format!("{PAYOUT_NUMBER_PREFIX}{sequence:06}")
}

/// Inverse of [`format_payout_number`].
pub fn parse_payout_number(s: &str) -> Option<i64> {
    let digits = s.strip_prefix(PAYOUT_NUMBER_PREFIX)?;
    if digits.len() < 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPolicy {
    /// Percent of the batch total withheld as a transaction fee.
    pub transaction_fee_rate: Decimal,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            transaction_fee_rate: Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub seller_id: Uuid,
    pub commission_ids: Vec<Uuid>,
}

/// One commission the plan intends to claim, with the version it was seen at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedClaim {
    pub commission_id: Uuid,
    pub expected_version: i64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutPlan {
    pub seller_id: Uuid,
    /// Sorted by `commission_id`; stores lock rows in this order.
    pub claims: Vec<PlannedClaim>,
    pub total_amount: Decimal,
    pub transaction_fee: Decimal,
    pub net_amount: Decimal,
    pub payment_method: String,
}

/// Everything a store writes when it applies a plan.
#[derive(Debug, Clone)]
pub struct IssuedPayout {
    pub payout: CommissionPayout,
    pub items: Vec<CommissionPayoutItem>,
    pub claim: ClaimToken,
}

/// Validate a payout request against a snapshot of the named commissions.
///
/// `candidates` may contain more or fewer rows than were requested;
/// only rows whose id was requested, that belong to the seller, and that are
/// `Approved` are eligible. Duplicate ids collapse.
pub fn plan_payout(
    request: &PayoutRequest,
    candidates: &[SellerCommission],
    settings: &SellerCommissionSettings,
    policy: &PayoutPolicy,
) -> Result<PayoutPlan, CommissionError> {
    ensure_rate("transaction_fee_rate", policy.transaction_fee_rate)?;
    if settings.seller_id != request.seller_id {
        return Err(CommissionError::Validation(format!(
            "settings for seller {} supplied for request of seller {}",
            settings.seller_id, request.seller_id
        )));
    }

    let requested: BTreeSet<Uuid> = request.commission_ids.iter().copied().collect();
    let mut seen = BTreeSet::new();
    let mut claims: Vec<PlannedClaim> = candidates
        .iter()
        .filter(|c| requested.contains(&c.id))
        .filter(|c| c.seller_id == request.seller_id)
        .filter(|c| c.status == CommissionStatus::Approved)
        .filter(|c| seen.insert(c.id))
        .map(|c| PlannedClaim {
            commission_id: c.id,
            expected_version: c.version,
            amount: c.net_amount,
        })
        .collect();

    if claims.is_empty() {
        return Err(CommissionError::NoEligibleCommissions {
            seller_id: request.seller_id,
        });
    }
    claims.sort_by_key(|c| c.commission_id);

    let total_amount = sum_money(claims.iter().map(|c| c.amount));
    let minimum = settings.minimum_payout_amount;
    if total_amount < minimum || total_amount <= Decimal::ZERO {
        return Err(CommissionError::BelowMinimumPayout {
            total: total_amount,
            minimum,
        });
    }

    let transaction_fee = round_money(percent_of(total_amount, policy.transaction_fee_rate)?);

    Ok(PayoutPlan {
        seller_id: request.seller_id,
        claims,
        total_amount,
        transaction_fee,
        net_amount: total_amount - transaction_fee,
        payment_method: settings.payment_method.clone(),
    })
}

impl PayoutPlan {
    pub fn commission_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.claims.iter().map(|c| c.commission_id)
    }

    /// Materialise the payout once the store has allocated `sequence`.
    pub fn issue(&self, payout_id: Uuid, sequence: i64, now: DateTime<Utc>) -> IssuedPayout {
        let payout_number = format_payout_number(sequence);
        let payout = CommissionPayout {
            id: payout_id,
            seller_id: self.seller_id,
            payout_number: payout_number.clone(),
            total_amount: self.total_amount,
            transaction_fee: self.transaction_fee,
            net_amount: self.net_amount,
            status: PayoutStatus::Pending,
            payment_method: self.payment_method.clone(),
            transaction_reference: None,
            processed_at: None,
            completed_at: None,
            failed_at: None,
            notes: None,
            created_at: now,
            version: 0,
        };
        let items = self
            .claims
            .iter()
            .map(|c| CommissionPayoutItem {
                payout_id,
                commission_id: c.commission_id,
                amount: c.amount,
            })
            .collect();
        let claim = ClaimToken::new(payout_number, self.commission_ids().collect());
        IssuedPayout {
            payout,
            items,
            claim,
        }
    }

    /// Confirm a freshly locked row still matches what was planned.
    pub fn verify_locked(&self, row: &SellerCommission) -> Result<(), CommissionError> {
        let Some(planned) = self.claims.iter().find(|c| c.commission_id == row.id) else {
            return Err(CommissionError::Validation(format!(
                "commission {} is not part of the plan",
                row.id
            )));
        };
        if row.version != planned.expected_version || row.status != CommissionStatus::Approved {
            return Err(CommissionError::ConcurrencyConflict(format!(
                "commission {} changed since planning (status {}, version {} != {})",
                row.id,
                row.status.as_str(),
                row.version,
                planned.expected_version
            )));
        }
        Ok(())
    }
}
