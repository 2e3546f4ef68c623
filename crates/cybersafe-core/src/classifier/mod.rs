//! Severity classification of externally produced risk scores.
//!
//! The classifier never sees message text. It receives the three
//! probabilities emitted by the on-device models and buckets them into a
//! [`Severity`] tier using the thresholds from a [`SafetyPolicy`](crate::policy::SafetyPolicy).

mod severity;

pub use severity::{RiskScores, Severity, SeverityClassifier};
