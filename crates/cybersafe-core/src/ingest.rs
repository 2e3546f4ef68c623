//! Ingestion front door.
//!
//! Validates and classifies a scoring event synchronously, hands the verdict
//! to the background lane, and returns. Nothing that happens in the lane is
//! reported back to the caller.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{RiskScores, Severity, SeverityClassifier};
use crate::engine::ScoringJob;
use crate::error::{Result, SafetyError};
use crate::worker::WorkerHandle;

/// One set of scores for one message. Never contains message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub account_id: String,
    pub source_app: String,
    pub scores: RiskScores,
}

impl ScoringEvent {
    /// Creates an event.
    pub fn new(
        account_id: impl Into<String>,
        source_app: impl Into<String>,
        scores: RiskScores,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            source_app: source_app.into(),
            scores,
        }
    }

    /// Rejects blank account ids and scores outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(SafetyError::Validation(
                "account_id must not be empty".to_string(),
            ));
        }
        if let Some((name, value)) = self.scores.first_out_of_range() {
            return Err(SafetyError::Validation(format!(
                "{} score must be within [0, 1], got {}",
                name, value
            )));
        }
        Ok(())
    }
}

/// What the caller is told happened to the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestAction {
    /// Low severity.
    None,
    /// Medium or High severity.
    Logged,
}

impl From<Severity> for IngestAction {
    fn from(severity: Severity) -> Self {
        if severity.is_reportable() {
            IngestAction::Logged
        } else {
            IngestAction::None
        }
    }
}

/// Immediate response to a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub severity: Severity,
    pub action: IngestAction,
}

/// Synchronous entry point for scoring events.
#[derive(Debug, Clone)]
pub struct FrontDoor {
    classifier: SeverityClassifier,
    lane: WorkerHandle,
}

impl FrontDoor {
    /// Creates a front door feeding the given lane.
    pub fn new(classifier: SeverityClassifier, lane: WorkerHandle) -> Self {
        Self { classifier, lane }
    }

    /// Validates, classifies, and enqueues an event.
    ///
    /// Only validation errors are returned; everything after classification
    /// happens in the background.
    pub fn submit(&self, event: ScoringEvent) -> Result<SubmitResponse> {
        event.validate()?;

        let severity = self.classifier.classify(&event.scores);
        debug!(
            account_id = %event.account_id,
            source_app = %event.source_app,
            severity = %severity,
            "Scoring event accepted"
        );

        self.lane.submit(ScoringJob {
            account_id: event.account_id,
            source_app: event.source_app,
            scores: event.scores,
            severity,
            received_at: Utc::now(),
        });

        Ok(SubmitResponse {
            severity,
            action: severity.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SafetyPolicy;

    fn front_door() -> (FrontDoor, tokio::sync::mpsc::UnboundedReceiver<ScoringJob>) {
        let (lane, rx) = WorkerHandle::channel();
        let classifier = SeverityClassifier::new(&SafetyPolicy::with_thresholds(0.8, 0.5).unwrap());
        (FrontDoor::new(classifier, lane), rx)
    }

    #[test]
    fn test_submit_classifies_and_enqueues() {
        let (door, mut rx) = front_door();

        let response = door
            .submit(ScoringEvent::new(
                "kid",
                "WhatsApp",
                RiskScores::new(0.1, 0.95, 0.2),
            ))
            .unwrap();
        assert_eq!(response.severity, Severity::High);
        assert_eq!(response.action, IngestAction::Logged);

        let job = rx.try_recv().unwrap();
        assert_eq!(job.account_id, "kid");
        assert_eq!(job.severity, Severity::High);
        assert_eq!(job.source_app, "WhatsApp");
    }

    #[test]
    fn test_low_severity_action_is_none() {
        let (door, mut rx) = front_door();
        let response = door
            .submit(ScoringEvent::new(
                "kid",
                "WhatsApp",
                RiskScores::new(0.05, 0.02, 0.1),
            ))
            .unwrap();
        assert_eq!(response.severity, Severity::Low);
        assert_eq!(response.action, IngestAction::None);

        // Low events still reach the lane so they are recorded
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_invalid_scores_have_no_side_effects() {
        let (door, mut rx) = front_door();

        let err = door
            .submit(ScoringEvent::new("kid", "app", RiskScores::new(0.1, 1.2, 0.0)))
            .unwrap_err();
        assert!(matches!(err, SafetyError::Validation(_)));

        let err = door
            .submit(ScoringEvent::new("  ", "app", RiskScores::default()))
            .unwrap_err();
        assert!(matches!(err, SafetyError::Validation(_)));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_lane_still_answers() {
        let (door, rx) = front_door();
        drop(rx);

        let response = door
            .submit(ScoringEvent::new("kid", "app", RiskScores::new(0.6, 0.0, 0.0)))
            .unwrap();
        assert_eq!(response.severity, Severity::Medium);
    }

    #[test]
    fn test_action_serialization() {
        let response = SubmitResponse {
            severity: Severity::Medium,
            action: IngestAction::Logged,
        };
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["severity"], "Medium");
        assert_eq!(json["action"], "logged");
    }
}
