//! Axum router and all HTTP handlers for mkt-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers are thin: decode, call the engine, map the
//! result. Every `CommissionError` goes through [`ApiError`] so the status
//! mapping lives in one place:
//!
//! ```text
//! NotFound                               404
//! InvalidStateTransition                 409
//! ConcurrencyConflict                    409  retryable: true
//! BelowMinimumPayout / NoEligible...     422
//! Validation / MissingSeller             400
//! AlreadyExists                          409
//! Storage                                500
//! ```

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use mkt_commission::{CommissionError, PaymentConfirmed, PayoutRequest, RecordOutcome};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    api_types::{
        ErrorResponse, FailPayoutRequest, FailPayoutResponse, HealthResponse,
        ProcessPayoutRequest, RecordResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/commissions/payment-confirmed", post(payment_confirmed))
        .route("/v1/commissions/:id", get(get_commission))
        .route("/v1/commissions/:id/approve", post(approve_commission))
        .route("/v1/commissions/:id/cancel", post(cancel_commission))
        .route("/v1/payouts", post(request_payout))
        .route("/v1/payouts/:id", get(get_payout))
        .route("/v1/payouts/:id/process", post(process_payout))
        .route("/v1/payouts/:id/complete", post(complete_payout))
        .route("/v1/payouts/:id/fail", post(fail_payout))
        .route("/v1/sellers/:id/balance", get(seller_balance))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub(crate) struct ApiError(CommissionError);

impl From<CommissionError> for ApiError {
    fn from(e: CommissionError) -> Self {
        ApiError(e)
    }
}

pub(crate) fn status_for(err: &CommissionError) -> StatusCode {
    match err {
        CommissionError::NotFound { .. } => StatusCode::NOT_FOUND,
        CommissionError::AlreadyExists { .. }
        | CommissionError::InvalidStateTransition { .. }
        | CommissionError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
        CommissionError::BelowMinimumPayout { .. }
        | CommissionError::NoEligibleCommissions { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CommissionError::Validation(_) | CommissionError::MissingSeller { .. } => {
            StatusCode::BAD_REQUEST
        }
        CommissionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = ?self.0, "request failed in storage");
        }
        (status, Json(ErrorResponse::from_error(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            store: st.engine.store().backend(),
            uptime_secs: uptime_secs(),
            config_hash: st.config_hash.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Commissions
// ---------------------------------------------------------------------------

/// 201 with the new commission, or 200 with `already_exists: true` for a
/// retried signal.
pub(crate) async fn payment_confirmed(
    State(st): State<Arc<AppState>>,
    Json(signal): Json<PaymentConfirmed>,
) -> ApiResult<Response> {
    let outcome = st.engine.on_payment_confirmed(&signal).await?;
    let (status, already_exists) = match &outcome {
        RecordOutcome::Created(_) => (StatusCode::CREATED, false),
        RecordOutcome::AlreadyExists(_) => (StatusCode::OK, true),
    };
    let body = RecordResponse {
        already_exists,
        commission: outcome.into_commission(),
    };
    Ok((status, Json(body)).into_response())
}

pub(crate) async fn get_commission(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let c = st.engine.commission(id).await?;
    Ok(Json(c).into_response())
}

pub(crate) async fn approve_commission(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let c = st.engine.approve(id).await?;
    Ok(Json(c).into_response())
}

pub(crate) async fn cancel_commission(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let c = st.engine.cancel(id).await?;
    Ok(Json(c).into_response())
}

// ---------------------------------------------------------------------------
// Payouts
// ---------------------------------------------------------------------------

pub(crate) async fn request_payout(
    State(st): State<Arc<AppState>>,
    Json(req): Json<PayoutRequest>,
) -> ApiResult<Response> {
    let record = st.engine.request_payout(&req).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub(crate) async fn get_payout(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let record = st.engine.payout(id).await?;
    Ok(Json(record).into_response())
}

pub(crate) async fn process_payout(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProcessPayoutRequest>,
) -> ApiResult<Response> {
    let p = st.engine.process_payout(id, &req.transaction_reference).await?;
    Ok(Json(p).into_response())
}

pub(crate) async fn complete_payout(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let p = st.engine.complete_payout(id).await?;
    Ok(Json(p).into_response())
}

pub(crate) async fn fail_payout(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<FailPayoutRequest>,
) -> ApiResult<Response> {
    let (payout, reverted_commissions) = st.engine.fail_payout(id, &req.reason).await?;
    info!(
        payout_number = %payout.payout_number,
        reverted = reverted_commissions.len(),
        "payouts/fail"
    );
    let _ = st.bus.send(BusMsg::LogLine {
        level: "WARN".to_string(),
        msg: format!("payout {} failed: {}", payout.payout_number, req.reason.trim()),
    });
    Ok(Json(FailPayoutResponse {
        payout,
        reverted_commissions,
    })
    .into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/sellers/{id}/balance
// ---------------------------------------------------------------------------

pub(crate) async fn seller_balance(
    State(st): State<Arc<AppState>>,
    Path(seller_id): Path<Uuid>,
) -> ApiResult<Response> {
    let bal = st.engine.seller_balance(seller_id).await?;
    Ok(Json(bal).into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
