//! Error taxonomy shared by every layer of the commission engine.
//!
//! Domain code returns these variants directly. Storage adapters wrap their
//! driver failures in [`CommissionError::Storage`] so callers (daemon, CLI)
//! can map a single enum onto user-visible responses.

use rust_decimal::Decimal;
use uuid::Uuid;

/// Kind of record named by [`CommissionError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Seller,
    Commission,
    Payout,
    Tier,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Seller => "seller",
            EntityKind::Commission => "commission",
            EntityKind::Payout => "payout",
            EntityKind::Tier => "tier",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    /// A non-cancelled commission already exists for the order item.
    /// Callers that treat duplicates as success use
    /// [`RecordOutcome`](crate::RecordOutcome) instead of this variant.
    #[error("commission already recorded for order item {order_item_id} (commission {existing_id})")]
    AlreadyExists { order_item_id: Uuid, existing_id: Uuid },

    #[error("illegal {kind} transition: {from} -> {action} (id {id})")]
    InvalidStateTransition {
        kind: EntityKind,
        id: Uuid,
        from: &'static str,
        action: &'static str,
    },

    #[error("payout total {total} is below the seller minimum payout {minimum}")]
    BelowMinimumPayout { total: Decimal, minimum: Decimal },

    #[error("no approved commissions eligible for payout for seller {seller_id}")]
    NoEligibleCommissions { seller_id: Uuid },

    /// Lost a race against a concurrent writer. Safe to retry.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("order item {order_item_id} has no assigned seller")]
    MissingSeller { order_item_id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CommissionError {
    /// Only claim races are retryable; everything else is a business or
    /// programming error that will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommissionError::ConcurrencyConflict(_))
    }

    /// Stable machine-readable code for API bodies and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            CommissionError::NotFound { .. } => "NOT_FOUND",
            CommissionError::AlreadyExists { .. } => "ALREADY_EXISTS",
            CommissionError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            CommissionError::BelowMinimumPayout { .. } => "BELOW_MINIMUM_PAYOUT",
            CommissionError::NoEligibleCommissions { .. } => "NO_ELIGIBLE_COMMISSIONS",
            CommissionError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            CommissionError::MissingSeller { .. } => "MISSING_SELLER",
            CommissionError::Validation(_) => "VALIDATION",
            CommissionError::Storage(_) => "STORAGE",
        }
    }

    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        CommissionError::NotFound { kind, id }
    }
}
