//! Request and response types for the mkt-daemon HTTP endpoints.
//!
//! Domain records (`SellerCommission`, `CommissionPayout`, `SellerBalance`)
//! are serialized as-is; only envelopes and request bodies live here.

use mkt_commission::{CommissionError, CommissionPayout, SellerCommission};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    /// "postgres" | "memory"
    pub store: &'static str,
    pub uptime_secs: u64,
    pub config_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// /v1/commissions/payment-confirmed
// ---------------------------------------------------------------------------

/// `already_exists: true` means the order item already had a live
/// commission and nothing was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub already_exists: bool,
    pub commission: SellerCommission,
}

// ---------------------------------------------------------------------------
// /v1/payouts/{id}/process  /v1/payouts/{id}/fail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPayoutRequest {
    pub transaction_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailPayoutRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailPayoutResponse {
    pub payout: CommissionPayout,
    /// Member commissions, now back in `APPROVED`.
    pub reverted_commissions: Vec<SellerCommission>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response produced by a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable code, e.g. "CONCURRENCY_CONFLICT".
    pub error: String,
    pub reason: String,
    /// True only for claim races; the caller may resend the same request.
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn from_error(err: &CommissionError) -> Self {
        let reason = match err {
            // Driver messages can carry hostnames and SQL; keep them in logs.
            CommissionError::Storage(_) => "internal storage error".to_string(),
            other => other.to_string(),
        };
        Self {
            error: err.code().to_string(),
            reason,
            retryable: err.is_retryable(),
        }
    }
}
