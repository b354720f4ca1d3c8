//! mkt-commission
//!
//! Seller commission & payout domain model.
//! - Tier resolution (seller override → prioritized tiers → explicit default)
//! - Per-item commission arithmetic on exact decimals, rounded once
//! - Ledger entry state machine (Pending → Approved → Paid | Cancelled)
//! - Payout batching plans with version-checked claims
//! - Payout state machine with compensating rollback
//! - Seller balance projection + reconciliation identity
//! - Pure deterministic logic (no IO, no clock, no randomness)

mod error;
mod types;

pub mod calculator;
pub mod ledger;
pub mod money;
pub mod payout;
pub mod projection;
pub mod settlement;
pub mod tier;

pub use calculator::{calculate, CommissionBreakdown};
pub use error::{CommissionError, EntityKind};
pub use ledger::{find_live_for_item, ClaimToken, RecordOutcome, RollbackToken, Transition};
pub use money::{round_money, MONEY_DP};
pub use payout::{
    format_payout_number, parse_payout_number, plan_payout, IssuedPayout, PayoutPlan,
    PayoutPolicy, PayoutRequest, PlannedClaim, PAYOUT_NUMBER_PREFIX,
};
pub use projection::{project_balance, ReconciliationBreak, SellerBalance, StatusCounts};
pub use tier::{resolve_rates, select_tier, validate_tier_table, DefaultRates, TierConflict};
pub use types::{
    CommissionPayout, CommissionPayoutItem, CommissionStatus, CommissionTier, PaymentConfirmed,
    PayoutCompleted, PayoutStatus, RateSource, ResolvedRates, SellerCommission,
    SellerCommissionSettings,
};
