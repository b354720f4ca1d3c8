use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CommissionError;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle of one ledger entry.
///
/// ```text
/// Pending ──approve──► Approved ──mark_paid──► Paid
///    │                  │   ▲                    │
///    └──cancel──┐       │   └─revert_to_approved─┘   (payout rollback only)
///               ▼       ▼
///             Cancelled (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "PENDING",
            CommissionStatus::Approved => "APPROVED",
            CommissionStatus::Paid => "PAID",
            CommissionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CommissionError> {
        match s {
            "PENDING" => Ok(CommissionStatus::Pending),
            "APPROVED" => Ok(CommissionStatus::Approved),
            "PAID" => Ok(CommissionStatus::Paid),
            "CANCELLED" => Ok(CommissionStatus::Cancelled),
            other => Err(CommissionError::Validation(format!(
                "invalid commission status: {other}"
            ))),
        }
    }
}

/// Lifecycle of one payout batch.
///
/// `Pending → Processing → Completed`, or `Processing → Failed` (which
/// returns every member commission to `Approved`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "PENDING",
            PayoutStatus::Processing => "PROCESSING",
            PayoutStatus::Completed => "COMPLETED",
            PayoutStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CommissionError> {
        match s {
            "PENDING" => Ok(PayoutStatus::Pending),
            "PROCESSING" => Ok(PayoutStatus::Processing),
            "COMPLETED" => Ok(PayoutStatus::Completed),
            "FAILED" => Ok(PayoutStatus::Failed),
            other => Err(CommissionError::Validation(format!(
                "invalid payout status: {other}"
            ))),
        }
    }

    /// Money is still owed to (or on its way to) the seller.
    pub fn is_in_transit(&self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Processing)
    }
}

// ---------------------------------------------------------------------------
// Policy records (read-only from the ledger's point of view)
// ---------------------------------------------------------------------------

/// A sales-volume band mapping to a commission / platform-fee rate pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionTier {
    pub id: Uuid,
    pub name: String,
    /// Inclusive lower bound on cumulative seller sales.
    pub min_sales: Decimal,
    /// Inclusive upper bound on cumulative seller sales.
    pub max_sales: Decimal,
    /// Percent, e.g. `10` for 10%.
    pub commission_rate: Decimal,
    /// Percent.
    pub platform_fee_rate: Decimal,
    /// Lower wins.
    pub priority: i32,
    pub is_active: bool,
}

impl CommissionTier {
    pub fn covers(&self, cumulative_sales: Decimal) -> bool {
        self.min_sales <= cumulative_sales && cumulative_sales <= self.max_sales
    }

    pub fn validate(&self) -> Result<(), CommissionError> {
        if self.name.trim().is_empty() {
            return Err(CommissionError::Validation("tier name must not be empty".into()));
        }
        if self.min_sales > self.max_sales {
            return Err(CommissionError::Validation(format!(
                "tier {}: min_sales {} > max_sales {}",
                self.name, self.min_sales, self.max_sales
            )));
        }
        crate::money::ensure_rate("commission_rate", self.commission_rate)?;
        crate::money::ensure_rate("platform_fee_rate", self.platform_fee_rate)?;
        Ok(())
    }
}

/// Per-seller commission settings. Absent settings mean "defaults".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerCommissionSettings {
    pub seller_id: Uuid,
    pub custom_commission_rate: Option<Decimal>,
    pub use_custom_rate: bool,
    pub minimum_payout_amount: Decimal,
    pub payment_method: String,
    /// Opaque to this subsystem.
    pub payment_details: Value,
}

impl SellerCommissionSettings {
    pub const DEFAULT_PAYMENT_METHOD: &'static str = "bank_transfer";

    /// Settings used for a seller that never wrote any.
    pub fn defaults_for(seller_id: Uuid, minimum_payout_amount: Decimal) -> Self {
        Self {
            seller_id,
            custom_commission_rate: None,
            use_custom_rate: false,
            minimum_payout_amount,
            payment_method: Self::DEFAULT_PAYMENT_METHOD.to_string(),
            payment_details: Value::Null,
        }
    }

    pub fn validate(&self) -> Result<(), CommissionError> {
        if let Some(rate) = self.custom_commission_rate {
            crate::money::ensure_rate("custom_commission_rate", rate)?;
        }
        if self.use_custom_rate && self.custom_commission_rate.is_none() {
            return Err(CommissionError::Validation(format!(
                "seller {}: use_custom_rate is set but custom_commission_rate is missing",
                self.seller_id
            )));
        }
        if self.minimum_payout_amount < Decimal::ZERO {
            return Err(CommissionError::Validation(format!(
                "seller {}: minimum_payout_amount must be >= 0",
                self.seller_id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rate resolution output
// ---------------------------------------------------------------------------

/// Which rule produced a commission's rates. Persisted on every ledger
/// entry so a fallback to the default pair is visible in audit queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateSource {
    Tier { name: String },
    Custom,
    Default,
}

impl RateSource {
    /// `tier:<name>` | `custom` | `default`
    pub fn label(&self) -> String {
        match self {
            RateSource::Tier { name } => format!("tier:{name}"),
            RateSource::Custom => "custom".to_string(),
            RateSource::Default => "default".to_string(),
        }
    }

    pub fn parse_label(s: &str) -> Result<Self, CommissionError> {
        match s {
            "custom" => Ok(RateSource::Custom),
            "default" => Ok(RateSource::Default),
            other => match other.strip_prefix("tier:") {
                Some(name) if !name.is_empty() => Ok(RateSource::Tier {
                    name: name.to_string(),
                }),
                _ => Err(CommissionError::Validation(format!(
                    "invalid rate source: {other}"
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRates {
    pub commission_rate: Decimal,
    pub platform_fee_rate: Decimal,
    pub source: RateSource,
}

// ---------------------------------------------------------------------------
// Inbound signal
// ---------------------------------------------------------------------------

/// "Payment confirmed" signal from order management. Triggers `Record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    /// `None` when the order item was never assigned to a seller.
    pub seller_id: Option<Uuid>,
    pub order_item_amount: Decimal,
    /// Precomputed lifetime completed-sales volume, when order management
    /// already knows it. Otherwise the store derives it from the ledger.
    #[serde(default)]
    pub cumulative_sales: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Ledger entry
// ---------------------------------------------------------------------------

/// Money owed to a seller for one order item.
///
/// `order_amount`, the rates and the three derived amounts are fixed at
/// creation. Only `status` and its timestamps / reference move, and every
/// move bumps `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerCommission {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub order_amount: Decimal,
    pub commission_rate: Decimal,
    pub platform_fee_rate: Decimal,
    pub rate_source: RateSource,
    pub commission_amount: Decimal,
    pub platform_fee: Decimal,
    pub net_amount: Decimal,
    pub status: CommissionStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency token.
    pub version: i64,
}

// ---------------------------------------------------------------------------
// Payout aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionPayout {
    pub id: Uuid,
    pub seller_id: Uuid,
    /// `PAY-######`
    pub payout_number: String,
    pub total_amount: Decimal,
    pub transaction_fee: Decimal,
    pub net_amount: Decimal,
    pub status: PayoutStatus,
    pub payment_method: String,
    pub transaction_reference: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub version: i64,
}

/// Join row between one payout and one claimed commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionPayoutItem {
    pub payout_id: Uuid,
    pub commission_id: Uuid,
    /// The commission's `net_amount` at claim time.
    pub amount: Decimal,
}

/// Emitted when a payout reaches `Completed`; delivered best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutCompleted {
    pub payout_number: String,
    pub seller_id: Uuid,
    pub net_amount: Decimal,
    pub transaction_reference: Option<String>,
}
