//! Payout state machine.
//!
//! ```text
//! Pending ──process(ref)──► Processing ──complete──► Completed (terminal)
//!                               │
//!                               └──fail(reason)───► Failed (terminal)
//!                                                   + every member commission
//!                                                     Paid → Approved
//! ```
//!
//! `fail` is the only rollback path in the subsystem. It returns a
//! [`RollbackToken`] naming the payout's members; the store must apply the
//! status change and every `revert_to_approved` in one atomic unit.

use chrono::{DateTime, Utc};

use crate::error::{CommissionError, EntityKind};
use crate::ledger::RollbackToken;
use crate::types::{CommissionPayout, CommissionPayoutItem, PayoutCompleted, PayoutStatus};

impl CommissionPayout {
    /// Pending → Processing, recording the settlement system's reference.
    pub fn process(&mut self, transaction_reference: &str, now: DateTime<Utc>) -> Result<(), CommissionError> {
        let reference = transaction_reference.trim();
        if reference.is_empty() {
            return Err(CommissionError::Validation(
                "transaction reference must not be empty".into(),
            ));
        }
        if self.status != PayoutStatus::Pending {
            return Err(self.illegal("process"));
        }
        self.status = PayoutStatus::Processing;
        self.transaction_reference = Some(reference.to_string());
        self.processed_at = Some(now);
        self.version += 1;
        Ok(())
    }

    /// Processing → Completed. Returns the notification payload.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<PayoutCompleted, CommissionError> {
        if self.status != PayoutStatus::Processing {
            return Err(self.illegal("complete"));
        }
        self.status = PayoutStatus::Completed;
        self.completed_at = Some(now);
        self.version += 1;
        Ok(PayoutCompleted {
            payout_number: self.payout_number.clone(),
            seller_id: self.seller_id,
            net_amount: self.net_amount,
            transaction_reference: self.transaction_reference.clone(),
        })
    }

    /// Processing → Failed. `members` must be this payout's items.
    pub fn fail(
        &mut self,
        reason: &str,
        members: &[CommissionPayoutItem],
        now: DateTime<Utc>,
    ) -> Result<RollbackToken, CommissionError> {
        if self.status != PayoutStatus::Processing {
            return Err(self.illegal("fail"));
        }
        if let Some(stray) = members.iter().find(|i| i.payout_id != self.id) {
            return Err(CommissionError::Validation(format!(
                "item for commission {} belongs to payout {}, not {}",
                stray.commission_id, stray.payout_id, self.id
            )));
        }

        self.status = PayoutStatus::Failed;
        self.failed_at = Some(now);
        self.append_note(&format!("failed: {}", reason.trim()));
        self.version += 1;

        Ok(RollbackToken::new(
            self.id,
            self.payout_number.clone(),
            members.iter().map(|i| i.commission_id).collect(),
        ))
    }

    fn append_note(&mut self, line: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
            _ => line.to_string(),
        });
    }

    fn illegal(&self, action: &'static str) -> CommissionError {
        CommissionError::InvalidStateTransition {
            kind: EntityKind::Payout,
            id: self.id,
            from: self.status.as_str(),
            action,
        }
    }
}
