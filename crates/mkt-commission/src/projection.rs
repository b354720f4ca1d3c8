//! Seller balance projection, derived on read from the ledger, never
//! maintained as a separately mutated counter.
//!
//! # Reconciliation identity
//!
//! Every commission's `net_amount` sits in exactly one bucket:
//!
//! ```text
//! pending + available + in_transit + total_paid + fees_withheld + cancelled
//!     == total_recorded
//! ```
//!
//! - `pending`   : commissions awaiting approval
//! - `available` : approved, unclaimed (includes members of failed payouts)
//! - `in_transit`: `total_amount` of Pending/Processing payouts
//! - `total_paid`: `net_amount` of Completed payouts
//! - `fees_withheld`: `transaction_fee` of Completed payouts
//! - `cancelled` : cancelled commissions
//!
//! A break in the identity means money was double-counted or lost.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CommissionPayout, CommissionStatus, PayoutStatus, SellerCommission};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerBalance {
    pub seller_id: Uuid,
    pub pending_balance: Decimal,
    pub available_balance: Decimal,
    pub in_transit_balance: Decimal,
    pub total_paid: Decimal,
    pub fees_withheld: Decimal,
    pub cancelled_amount: Decimal,
    pub total_recorded: Decimal,
    pub minimum_payout_amount: Decimal,
    pub eligible_for_payout: bool,
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub approved: u64,
    pub paid: u64,
    pub cancelled: u64,
    pub payouts_in_transit: u64,
    pub payouts_completed: u64,
    pub payouts_failed: u64,
}

/// The identity did not hold. Carries both sides for the alert.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("balance reconciliation break for seller {seller_id}: accounted {accounted} != recorded {recorded}")]
pub struct ReconciliationBreak {
    pub seller_id: Uuid,
    pub accounted: Decimal,
    pub recorded: Decimal,
}

/// Fold a seller's commissions and payouts into a [`SellerBalance`].
///
/// Rows belonging to other sellers are ignored, so callers may pass a
/// wider slice.
pub fn project_balance(
    seller_id: Uuid,
    commissions: &[SellerCommission],
    payouts: &[CommissionPayout],
    minimum_payout_amount: Decimal,
) -> SellerBalance {
    let mut b = SellerBalance {
        seller_id,
        pending_balance: Decimal::ZERO,
        available_balance: Decimal::ZERO,
        in_transit_balance: Decimal::ZERO,
        total_paid: Decimal::ZERO,
        fees_withheld: Decimal::ZERO,
        cancelled_amount: Decimal::ZERO,
        total_recorded: Decimal::ZERO,
        minimum_payout_amount,
        eligible_for_payout: false,
        counts: StatusCounts::default(),
    };

    for c in commissions.iter().filter(|c| c.seller_id == seller_id) {
        b.total_recorded += c.net_amount;
        match c.status {
            CommissionStatus::Pending => {
                b.pending_balance += c.net_amount;
                b.counts.pending += 1;
            }
            CommissionStatus::Approved => {
                b.available_balance += c.net_amount;
                b.counts.approved += 1;
            }
            // Paid entries are accounted through their payout.
            CommissionStatus::Paid => b.counts.paid += 1,
            CommissionStatus::Cancelled => {
                b.cancelled_amount += c.net_amount;
                b.counts.cancelled += 1;
            }
        }
    }

    for p in payouts.iter().filter(|p| p.seller_id == seller_id) {
        match p.status {
            PayoutStatus::Pending | PayoutStatus::Processing => {
                b.in_transit_balance += p.total_amount;
                b.counts.payouts_in_transit += 1;
            }
            PayoutStatus::Completed => {
                b.total_paid += p.net_amount;
                b.fees_withheld += p.transaction_fee;
                b.counts.payouts_completed += 1;
            }
            // Members were reverted to Approved and are counted there.
            PayoutStatus::Failed => b.counts.payouts_failed += 1,
        }
    }

    b.eligible_for_payout =
        b.available_balance > Decimal::ZERO && b.available_balance >= minimum_payout_amount;
    b
}

impl SellerBalance {
    pub fn accounted_total(&self) -> Decimal {
        self.pending_balance
            + self.available_balance
            + self.in_transit_balance
            + self.total_paid
            + self.fees_withheld
            + self.cancelled_amount
    }

    pub fn reconcile(&self) -> Result<(), ReconciliationBreak> {
        let accounted = self.accounted_total();
        if accounted == self.total_recorded {
            Ok(())
        } else {
            Err(ReconciliationBreak {
                seller_id: self.seller_id,
                accounted,
                recorded: self.total_recorded,
            })
        }
    }
}
