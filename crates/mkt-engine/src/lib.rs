//! mkt-engine
//!
//! Orchestration layer between callers (daemon, CLI) and storage.
//! - `CommissionStore`: async persistence seam; every mutation is atomic
//! - `InMemoryStore`: single-lock implementation for tests and demos
//! - `PayoutNotifier`: best-effort payout-completed delivery
//! - `CommissionEngine`: the operator-facing operations, with bounded claim
//!   retries and structured logs

pub mod memory;
pub mod notify;
pub mod service;
pub mod store;

pub use memory::InMemoryStore;
pub use notify::{FanoutNotifier, PayoutNotifier, TracingNotifier};
pub use service::{CommissionEngine, EnginePolicy};
pub use store::{CommissionStore, PayoutRecord, SellerSnapshot, StoreResult};
