//! API route handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use cybersafe_core::{
    Account, Dashboard, NewAccount, ScoringEvent, SubmitResponse, TrustedContact,
};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{AlertsQuery, AlertsResponse, AnalyzeRequest, MessageResponse};
use crate::state::AppState;

/// GET / - Liveness check.
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "CyberSafe Mobile Protection API is running".to_string(),
    })
}

/// POST /api/analyze - Classify scores and queue the safety update.
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<SubmitResponse>> {
    let event = ScoringEvent::from(req);
    debug!(account_id = %event.account_id, source_app = %event.source_app, "Analyze request");

    let response = state.front_door.submit(event)?;
    Ok(Json(response))
}

/// POST /api/accounts - Register a monitored account.
pub async fn open_account(
    State(state): State<AppState>,
    Json(req): Json<NewAccount>,
) -> Result<(StatusCode, Json<Account>)> {
    let account = state.engine.open_account(req)?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// POST /api/accounts/{id}/unlock - Restore full safety and re-arm the alert.
pub async fn unlock_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Account>> {
    info!(account_id = %account_id, "Unlock requested");
    let account = state.engine.unlock_account(&account_id)?;
    Ok(Json(account))
}

/// PUT /api/accounts/{id}/trusted-contact - Replace the trusted contact.
pub async fn set_trusted_contact(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(contact): Json<TrustedContact>,
) -> Result<Json<Account>> {
    let account = state.engine.set_trusted_contact(&account_id, contact)?;
    Ok(Json(account))
}

/// GET /api/accounts/{id}/dashboard - Parent dashboard view.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Dashboard>> {
    let dashboard = state.engine.dashboard(&account_id)?;
    Ok(Json(dashboard))
}

/// GET /api/alerts/{id} - Full history, Low included.
pub async fn get_alerts(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<AlertsResponse>> {
    let alerts = state.engine.alert_history(&account_id, query.limit)?;
    Ok(Json(AlertsResponse { account_id, alerts }))
}
