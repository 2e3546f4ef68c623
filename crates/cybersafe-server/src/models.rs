//! API request and response models.

use cybersafe_core::{AlertRecord, RiskScores, ScoringEvent};
use serde::{Deserialize, Serialize};

use crate::DEFAULT_ALERTS_LIMIT;

/// Request body for POST /api/analyze.
///
/// Older mobile clients send `user_id`, `app_name` and `*_score` names.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(alias = "user_id")]
    pub account_id: String,
    #[serde(alias = "app_name")]
    pub source_app: String,
    #[serde(alias = "insult_score")]
    pub insult: f64,
    #[serde(alias = "threat_score")]
    pub threat: f64,
    #[serde(alias = "bullying_score")]
    pub bullying: f64,
}

impl From<AnalyzeRequest> for ScoringEvent {
    fn from(req: AnalyzeRequest) -> Self {
        ScoringEvent::new(
            req.account_id,
            req.source_app,
            RiskScores::new(req.insult, req.threat, req.bullying),
        )
    }
}

/// Simple message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Query parameters for GET /api/alerts/{id}.
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// Maximum number of records to return (default: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_ALERTS_LIMIT
}

/// Response body for GET /api/alerts/{id}.
#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub account_id: String,
    pub alerts: Vec<AlertRecord>,
}
