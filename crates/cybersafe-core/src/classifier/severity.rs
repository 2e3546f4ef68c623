//! Severity tiers and the weighted-max classifier.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::SafetyPolicy;

/// Severity tier derived from weighted risk scores.
///
/// Variants are declared in ascending order so the derived `Ord` gives
/// `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Below the medium threshold.
    Low,
    /// At or above the medium threshold.
    Medium,
    /// At or above the high threshold.
    High,
}

impl Severity {
    /// Returns all tiers in ascending order.
    pub fn all() -> &'static [Severity] {
        &[Severity::Low, Severity::Medium, Severity::High]
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }

    /// Parse from database string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Low" => Some(Severity::Low),
            "Medium" => Some(Severity::Medium),
            "High" => Some(Severity::High),
            _ => None,
        }
    }

    /// Whether this tier shows up on the dashboard.
    pub fn is_reportable(&self) -> bool {
        *self != Severity::Low
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three probabilities produced by the external classifier for one message.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskScores {
    /// Probability the message is an insult.
    pub insult: f64,
    /// Probability the message contains a threat.
    pub threat: f64,
    /// Probability the message is bullying.
    pub bullying: f64,
}

impl RiskScores {
    /// Creates a new score triple.
    pub fn new(insult: f64, threat: f64, bullying: f64) -> Self {
        Self {
            insult,
            threat,
            bullying,
        }
    }

    /// Returns the first score that is not a finite number in `[0, 1]`,
    /// as `(field name, value)`.
    pub fn first_out_of_range(&self) -> Option<(&'static str, f64)> {
        [
            ("insult", self.insult),
            ("threat", self.threat),
            ("bullying", self.bullying),
        ]
        .into_iter()
        .find(|(_, v)| !v.is_finite() || !(0.0..=1.0).contains(v))
    }
}

/// Pure weighted-max classifier.
///
/// Holds only the thresholds and weight it needs, copied out of the
/// policy at construction, so it is cheap to clone into request handlers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityClassifier {
    high_threshold: f64,
    medium_threshold: f64,
    threat_weight: f64,
}

impl SeverityClassifier {
    /// Creates a classifier from a (validated) policy.
    pub fn new(policy: &SafetyPolicy) -> Self {
        Self {
            high_threshold: policy.high_risk_threshold,
            medium_threshold: policy.medium_risk_threshold,
            threat_weight: policy.threat_weight,
        }
    }

    /// Combined score: `max(insult, threat * weight, bullying)`.
    ///
    /// The weighted threat term is not clamped, so it may exceed 1.0.
    pub fn weighted_score(&self, scores: &RiskScores) -> f64 {
        scores
            .insult
            .max(scores.threat * self.threat_weight)
            .max(scores.bullying)
    }

    /// Classifies a score triple. Thresholds are inclusive lower bounds.
    pub fn classify(&self, scores: &RiskScores) -> Severity {
        let score = self.weighted_score(scores);

        if score >= self.high_threshold {
            Severity::High
        } else if score >= self.medium_threshold {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl Default for SeverityClassifier {
    fn default() -> Self {
        Self::new(&SafetyPolicy::default())
    }
}
