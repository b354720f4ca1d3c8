//! `CommissionEngine`: the operations the outside world calls.
//!
//! The engine owns no state of its own. It reads policy inputs from the
//! store, runs the pure domain functions, and hands the result back to the
//! store to apply atomically. Everything it decides is logged with
//! `seller_id` / `commission_id` / `payout_number` fields.
//!
//! # Claim retries
//!
//! ```text
//! plan (snapshot) ──► claim (locked, version-checked)
//!        ▲                    │
//!        └── ConcurrencyConflict, attempts left ──┘
//! ```
//!
//! A re-plan that finds nothing left to claim after a lost race reports
//! `ConcurrencyConflict`, not `NoEligibleCommissions`: the caller's
//! commissions existed and were approved, another payout just took them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mkt_commission::{
    calculate, plan_payout, project_balance, resolve_rates, CommissionError, CommissionPayout,
    DefaultRates, PaymentConfirmed, PayoutPolicy, PayoutRequest, RateSource, RecordOutcome,
    SellerBalance, SellerCommission, SellerCommissionSettings, Transition,
};
use mkt_config::EngineConfig;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::notify::{PayoutNotifier, TracingNotifier};
use crate::store::{CommissionStore, PayoutRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePolicy {
    pub default_rates: DefaultRates,
    pub payout: PayoutPolicy,
    /// Minimum payout for sellers without settings.
    pub default_minimum_payout: Decimal,
    /// Total claim attempts per payout request (>= 1).
    pub claim_max_attempts: u32,
    pub notify_timeout: Duration,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl EnginePolicy {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        let p = &cfg.policy;
        Self {
            default_rates: DefaultRates {
                commission_rate: p.default_commission_rate,
                platform_fee_rate: p.default_platform_fee_rate,
            },
            payout: PayoutPolicy {
                transaction_fee_rate: p.transaction_fee_rate,
            },
            default_minimum_payout: p.default_minimum_payout,
            claim_max_attempts: p.claim_max_attempts.max(1),
            notify_timeout: Duration::from_millis(p.notify_timeout_ms),
        }
    }
}

pub struct CommissionEngine {
    store: Arc<dyn CommissionStore>,
    notifier: Arc<dyn PayoutNotifier>,
    policy: EnginePolicy,
}

impl CommissionEngine {
    pub fn new(store: Arc<dyn CommissionStore>, policy: EnginePolicy) -> Self {
        Self {
            store,
            notifier: Arc::new(TracingNotifier),
            policy,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PayoutNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn CommissionStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Commissions
    // -----------------------------------------------------------------------

    /// Record the commission for one paid order item. A retried signal for
    /// an item that already has a live commission returns
    /// [`RecordOutcome::AlreadyExists`].
    pub async fn on_payment_confirmed(
        &self,
        signal: &PaymentConfirmed,
    ) -> Result<RecordOutcome, CommissionError> {
        let Some(seller_id) = signal.seller_id else {
            tracing::warn!(
                order_id = %signal.order_id,
                order_item_id = %signal.order_item_id,
                "payment confirmed for order item without seller"
            );
            return Err(CommissionError::MissingSeller {
                order_item_id: signal.order_item_id,
            });
        };

        let settings = self.store.load_settings(seller_id).await?;
        let cumulative_sales = match signal.cumulative_sales {
            Some(v) => v,
            None => self.store.cumulative_sales(seller_id).await?,
        };
        let tiers = self.store.active_tiers().await?;

        let rates = resolve_rates(
            settings.as_ref(),
            cumulative_sales,
            &tiers,
            &self.policy.default_rates,
        )?;
        if rates.source == RateSource::Default {
            tracing::warn!(
                seller_id = %seller_id,
                cumulative_sales = %cumulative_sales,
                commission_rate = %rates.commission_rate,
                platform_fee_rate = %rates.platform_fee_rate,
                "no commission tier covers seller volume; applying default rates"
            );
        }

        let breakdown = calculate(signal.order_item_amount, &rates)?;
        let commission = SellerCommission::open(
            Uuid::new_v4(),
            signal,
            &breakdown,
            rates.source,
            Utc::now(),
        )?;

        let outcome = self.store.record_commission(commission).await?;
        let c = outcome.commission();
        if outcome.is_created() {
            tracing::info!(
                seller_id = %c.seller_id,
                commission_id = %c.id,
                order_item_id = %c.order_item_id,
                commission_amount = %c.commission_amount,
                platform_fee = %c.platform_fee,
                net_amount = %c.net_amount,
                rate_source = %c.rate_source.label(),
                "commission recorded"
            );
        } else {
            tracing::info!(
                seller_id = %c.seller_id,
                commission_id = %c.id,
                order_item_id = %c.order_item_id,
                "commission already recorded for order item; no-op"
            );
        }
        Ok(outcome)
    }

    pub async fn commission(&self, id: Uuid) -> Result<SellerCommission, CommissionError> {
        self.store.fetch_commission(id).await
    }

    pub async fn approve(&self, id: Uuid) -> Result<SellerCommission, CommissionError> {
        let (c, t) = self.store.approve_commission(id, Utc::now()).await?;
        if t == Transition::Applied {
            tracing::info!(seller_id = %c.seller_id, commission_id = %c.id, "commission approved");
        }
        Ok(c)
    }

    pub async fn cancel(&self, id: Uuid) -> Result<SellerCommission, CommissionError> {
        let (c, t) = self.store.cancel_commission(id, Utc::now()).await?;
        if t == Transition::Applied {
            tracing::info!(
                seller_id = %c.seller_id,
                commission_id = %c.id,
                net_amount = %c.net_amount,
                "commission cancelled"
            );
        }
        Ok(c)
    }

    // -----------------------------------------------------------------------
    // Payouts
    // -----------------------------------------------------------------------

    /// Batch the named commissions into one payout.
    pub async fn request_payout(&self, request: &PayoutRequest) -> Result<PayoutRecord, CommissionError> {
        let seller_id = request.seller_id;
        let settings = self.settings_or_default(seller_id).await?;
        let max = self.policy.claim_max_attempts.max(1);
        let mut last_conflict: Option<String> = None;

        for attempt in 1..=max {
            let candidates = self.store.commissions_by_ids(&request.commission_ids).await?;
            let plan = match plan_payout(request, &candidates, &settings, &self.policy.payout) {
                Ok(plan) => plan,
                Err(CommissionError::NoEligibleCommissions { .. }) if last_conflict.is_some() => {
                    return Err(CommissionError::ConcurrencyConflict(format!(
                        "commissions requested by seller {seller_id} were claimed by a concurrent payout ({})",
                        last_conflict.unwrap_or_default()
                    )));
                }
                Err(e) => {
                    tracing::info!(seller_id = %seller_id, code = e.code(), "payout request refused: {e}");
                    return Err(e);
                }
            };

            match self.store.claim_payout(&plan, Utc::now()).await {
                Ok(record) => {
                    tracing::info!(
                        seller_id = %seller_id,
                        payout_number = %record.payout.payout_number,
                        items = record.items.len(),
                        total_amount = %record.payout.total_amount,
                        transaction_fee = %record.payout.transaction_fee,
                        net_amount = %record.payout.net_amount,
                        attempt,
                        "payout created"
                    );
                    return Ok(record);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(seller_id = %seller_id, attempt, max, "payout claim lost a race: {e}");
                    last_conflict = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Err(CommissionError::ConcurrencyConflict(format!(
            "payout claim for seller {seller_id} still conflicting after {max} attempts: {}",
            last_conflict.unwrap_or_default()
        )))
    }

    pub async fn payout(&self, id: Uuid) -> Result<PayoutRecord, CommissionError> {
        self.store.fetch_payout(id).await
    }

    pub async fn process_payout(
        &self,
        id: Uuid,
        transaction_reference: &str,
    ) -> Result<CommissionPayout, CommissionError> {
        let p = self.store.process_payout(id, transaction_reference, Utc::now()).await?;
        tracing::info!(
            seller_id = %p.seller_id,
            payout_number = %p.payout_number,
            transaction_reference = p.transaction_reference.as_deref().unwrap_or(""),
            "payout processing"
        );
        Ok(p)
    }

    /// Complete the payout, then notify. Notification is best effort: a
    /// failing or slow notifier is logged and the completed payout is
    /// returned regardless.
    pub async fn complete_payout(&self, id: Uuid) -> Result<CommissionPayout, CommissionError> {
        let (p, event) = self.store.complete_payout(id, Utc::now()).await?;
        tracing::info!(
            seller_id = %p.seller_id,
            payout_number = %p.payout_number,
            net_amount = %p.net_amount,
            "payout completed"
        );

        match tokio::time::timeout(self.policy.notify_timeout, self.notifier.payout_completed(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                payout_number = %event.payout_number,
                error = %e,
                "payout-completed notification failed"
            ),
            Err(_) => tracing::warn!(
                payout_number = %event.payout_number,
                timeout_ms = self.policy.notify_timeout.as_millis() as u64,
                "payout-completed notification timed out"
            ),
        }
        Ok(p)
    }

    /// Fail the payout and return its commissions to the available pool.
    pub async fn fail_payout(
        &self,
        id: Uuid,
        reason: &str,
    ) -> Result<(CommissionPayout, Vec<SellerCommission>), CommissionError> {
        let (p, reverted) = self.store.fail_payout(id, reason, Utc::now()).await?;
        tracing::warn!(
            seller_id = %p.seller_id,
            payout_number = %p.payout_number,
            reverted = reverted.len(),
            reason,
            "payout failed; member commissions reverted to approved"
        );
        Ok((p, reverted))
    }

    // -----------------------------------------------------------------------
    // Projection
    // -----------------------------------------------------------------------

    /// Balance derived from the ledger. A reconciliation break is logged at
    /// ERROR; the numbers are still returned so operators can inspect them.
    pub async fn seller_balance(&self, seller_id: Uuid) -> Result<SellerBalance, CommissionError> {
        let snap = self.store.seller_snapshot(seller_id).await?;
        let minimum = snap
            .settings
            .as_ref()
            .map(|s| s.minimum_payout_amount)
            .unwrap_or(self.policy.default_minimum_payout);
        let balance = project_balance(seller_id, &snap.commissions, &snap.payouts, minimum);
        if let Err(brk) = balance.reconcile() {
            tracing::error!(
                seller_id = %seller_id,
                accounted = %brk.accounted,
                recorded = %brk.recorded,
                "seller balance does not reconcile"
            );
        }
        Ok(balance)
    }

    async fn settings_or_default(&self, seller_id: Uuid) -> Result<SellerCommissionSettings, CommissionError> {
        Ok(self
            .store
            .load_settings(seller_id)
            .await?
            .unwrap_or_else(|| {
                SellerCommissionSettings::defaults_for(seller_id, self.policy.default_minimum_payout)
            }))
    }
}
