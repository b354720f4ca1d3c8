//! Shared runtime state for mkt-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The engine owns all
//! ledger state; this module only wires it to the SSE bus.

use std::sync::Arc;
use std::time::Duration;

use mkt_commission::PayoutCompleted;
use mkt_engine::{
    CommissionEngine, CommissionStore, EnginePolicy, FanoutNotifier, InMemoryStore,
    PayoutNotifier, TracingNotifier,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    PayoutCompleted(PayoutCompleted),
    LogLine { level: String, msg: String },
}

impl BusMsg {
    /// SSE `event:` name.
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::PayoutCompleted(_) => "payout_completed",
            BusMsg::LogLine { .. } => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// BusNotifier
// ---------------------------------------------------------------------------

/// Publishes payout-completed events to SSE subscribers.
///
/// Having no subscribers is not a failure: the event is simply dropped.
#[derive(Clone)]
pub struct BusNotifier {
    bus: broadcast::Sender<BusMsg>,
}

impl BusNotifier {
    pub fn new(bus: broadcast::Sender<BusMsg>) -> Self {
        Self { bus }
    }
}

#[async_trait::async_trait]
impl PayoutNotifier for BusNotifier {
    async fn payout_completed(&self, event: &PayoutCompleted) -> anyhow::Result<()> {
        let _ = self.bus.send(BusMsg::PayoutCompleted(event.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub engine: Arc<CommissionEngine>,
    /// Canonical hash of the loaded config, when one was loaded.
    pub config_hash: Option<String>,
}

impl AppState {
    /// Engine over `store`, notifying both the log and the SSE bus.
    pub fn new(store: Arc<dyn CommissionStore>, policy: EnginePolicy) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let sinks: Vec<Arc<dyn PayoutNotifier>> = vec![
            Arc::new(TracingNotifier),
            Arc::new(BusNotifier::new(bus.clone())),
        ];
        let notifier = FanoutNotifier::new(sinks);
        let engine = CommissionEngine::new(store, policy).with_notifier(Arc::new(notifier));

        Self {
            bus,
            build: BuildInfo {
                service: "mkt-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            engine: Arc::new(engine),
            config_hash: None,
        }
    }

    /// Default policy over a fresh [`InMemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), EnginePolicy::default())
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
