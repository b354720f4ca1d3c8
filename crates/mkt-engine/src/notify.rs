//! Best-effort delivery of payout-completed events.
//!
//! A notifier never influences payout state: the engine calls it after the
//! Completed transition has been committed, bounds it with a timeout, and
//! only logs a failure.

use std::sync::Arc;

use anyhow::Result;
use mkt_commission::PayoutCompleted;

#[async_trait::async_trait]
pub trait PayoutNotifier: Send + Sync {
    async fn payout_completed(&self, event: &PayoutCompleted) -> Result<()>;
}

/// Writes the event to the log. Default when nothing else is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait::async_trait]
impl PayoutNotifier for TracingNotifier {
    async fn payout_completed(&self, event: &PayoutCompleted) -> Result<()> {
        tracing::info!(
            payout_number = %event.payout_number,
            seller_id = %event.seller_id,
            net_amount = %event.net_amount,
            transaction_reference = event.transaction_reference.as_deref().unwrap_or(""),
            "payout completed"
        );
        Ok(())
    }
}

/// Delivers to every inner notifier; the first error is returned after all
/// of them have been tried.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn PayoutNotifier>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Arc<dyn PayoutNotifier>>) -> Self {
        Self { sinks }
    }
}

#[async_trait::async_trait]
impl PayoutNotifier for FanoutNotifier {
    async fn payout_completed(&self, event: &PayoutCompleted) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.payout_completed(event).await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
