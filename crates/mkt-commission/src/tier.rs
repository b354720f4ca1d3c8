//! Tier resolution: which (commission, platform fee) pair applies to a
//! seller at a given lifetime sales volume.
//!
//! # Order of precedence
//! 1. Seller override (`use_custom_rate`): custom commission rate, zero fee.
//! 2. First active tier covering the volume, ascending by `priority`.
//! 3. The configured default pair, reported as [`RateSource::Default`].
//!
//! # Determinism
//! The tier table is never trusted to arrive in a particular order. Matches
//! are sorted by `priority` and then by tier *content* (narrowest band
//! first), so two equal tables in different orders, or with renamed tiers,
//! resolve identically.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CommissionError;
use crate::types::{CommissionTier, RateSource, ResolvedRates, SellerCommissionSettings};

/// Rate pair applied when no tier covers the seller's volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRates {
    pub commission_rate: Decimal,
    pub platform_fee_rate: Decimal,
}

impl Default for DefaultRates {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::TEN,
            platform_fee_rate: Decimal::TWO,
        }
    }
}

/// Resolve the rate pair for one seller.
///
/// `settings` is `None` for sellers that never wrote settings.
pub fn resolve_rates(
    settings: Option<&SellerCommissionSettings>,
    cumulative_sales: Decimal,
    tiers: &[CommissionTier],
    defaults: &DefaultRates,
) -> Result<ResolvedRates, CommissionError> {
    if let Some(s) = settings {
        if s.use_custom_rate {
            let rate = s.custom_commission_rate.ok_or_else(|| {
                CommissionError::Validation(format!(
                    "seller {}: use_custom_rate is set but custom_commission_rate is missing",
                    s.seller_id
                ))
            })?;
            crate::money::ensure_rate("custom_commission_rate", rate)?;
            return Ok(ResolvedRates {
                commission_rate: rate,
                platform_fee_rate: Decimal::ZERO,
                source: RateSource::Custom,
            });
        }
    }

    if let Some(tier) = select_tier(cumulative_sales, tiers) {
        return Ok(ResolvedRates {
            commission_rate: tier.commission_rate,
            platform_fee_rate: tier.platform_fee_rate,
            source: RateSource::Tier {
                name: tier.name.clone(),
            },
        });
    }

    Ok(ResolvedRates {
        commission_rate: defaults.commission_rate,
        platform_fee_rate: defaults.platform_fee_rate,
        source: RateSource::Default,
    })
}

/// The winning active tier for `cumulative_sales`, if any.
pub fn select_tier(cumulative_sales: Decimal, tiers: &[CommissionTier]) -> Option<&CommissionTier> {
    tiers
        .iter()
        .filter(|t| t.is_active && t.covers(cumulative_sales))
        .min_by(|a, b| precedence(a, b))
}

/// Total order over tiers that ignores `id` and `name`.
fn precedence(a: &CommissionTier, b: &CommissionTier) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.min_sales.cmp(&a.min_sales))
        .then_with(|| a.max_sales.cmp(&b.max_sales))
        .then_with(|| a.commission_rate.cmp(&b.commission_rate))
        .then_with(|| a.platform_fee_rate.cmp(&b.platform_fee_rate))
}

/// Two active tiers that share a priority and whose bands intersect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConflict {
    pub priority: i32,
    pub first: String,
    pub second: String,
}

/// Publish-time lint for a tier table.
///
/// Returns per-tier validation failures as an error, and otherwise the list
/// of ambiguous pairs (same priority, overlapping bands). Resolution is still
/// deterministic for ambiguous pairs; the list exists so operators can make
/// the intent explicit.
pub fn validate_tier_table(tiers: &[CommissionTier]) -> Result<Vec<TierConflict>, CommissionError> {
    for t in tiers {
        t.validate()?;
    }

    let active: Vec<&CommissionTier> = tiers.iter().filter(|t| t.is_active).collect();
    let mut conflicts = Vec::new();
    for (i, a) in active.iter().enumerate() {
        for b in active.iter().skip(i + 1) {
            let overlaps = a.min_sales <= b.max_sales && b.min_sales <= a.max_sales;
            if a.priority == b.priority && overlaps {
                let (first, second) = if a.name <= b.name {
                    (a.name.clone(), b.name.clone())
                } else {
                    (b.name.clone(), a.name.clone())
                };
                conflicts.push(TierConflict {
                    priority: a.priority,
                    first,
                    second,
                });
            }
        }
    }
    conflicts.sort_by(|x, y| {
        x.priority
            .cmp(&y.priority)
            .then_with(|| x.first.cmp(&y.first))
            .then_with(|| x.second.cmp(&y.second))
    });
    Ok(conflicts)
}
