//! Deployment policy: risk thresholds, threat weight, and the deduction table.
//!
//! A policy is an immutable value handed to the classifier and the engine at
//! construction. Different deployments ship different threshold sets, so
//! nothing here is read from global state.

use serde::{Deserialize, Serialize};

use crate::classifier::Severity;
use crate::error::{Result, SafetyError};

/// Default high-risk threshold.
pub const DEFAULT_HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Default medium-risk threshold.
pub const DEFAULT_MEDIUM_RISK_THRESHOLD: f64 = 0.4;

/// Default multiplier applied to the threat probability.
pub const DEFAULT_THREAT_WEIGHT: f64 = 1.2;

/// Safety percentage a fresh or unlocked account starts with.
pub const FULL_SAFETY: u8 = 100;

/// Safety-percentage deduction per severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeductionTable {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl Default for DeductionTable {
    fn default() -> Self {
        Self {
            low: 0,
            medium: 5,
            high: 50,
        }
    }
}

impl DeductionTable {
    /// Looks up the deduction for a tier.
    pub fn for_severity(&self, severity: Severity) -> u8 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
        }
    }
}

/// Complete safety policy for one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyPolicy {
    /// Weighted score at or above which a message is High severity.
    pub high_risk_threshold: f64,
    /// Weighted score at or above which a message is Medium severity.
    pub medium_risk_threshold: f64,
    /// Multiplier applied to the threat probability before taking the max.
    pub threat_weight: f64,
    /// Deduction applied per tier.
    pub deductions: DeductionTable,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            high_risk_threshold: DEFAULT_HIGH_RISK_THRESHOLD,
            medium_risk_threshold: DEFAULT_MEDIUM_RISK_THRESHOLD,
            threat_weight: DEFAULT_THREAT_WEIGHT,
            deductions: DeductionTable::default(),
        }
    }
}

impl SafetyPolicy {
    /// Creates a policy with custom thresholds and default weight/deductions.
    pub fn with_thresholds(high: f64, medium: f64) -> Result<Self> {
        let policy = Self {
            high_risk_threshold: high,
            medium_risk_threshold: medium,
            ..Self::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Checks the invariants the classifier and engine rely on.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("high_risk_threshold", self.high_risk_threshold),
            ("medium_risk_threshold", self.medium_risk_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(SafetyError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.high_risk_threshold <= self.medium_risk_threshold {
            return Err(SafetyError::Config(format!(
                "high_risk_threshold ({}) must be greater than medium_risk_threshold ({})",
                self.high_risk_threshold, self.medium_risk_threshold
            )));
        }

        if !self.threat_weight.is_finite() || self.threat_weight <= 0.0 {
            return Err(SafetyError::Config(format!(
                "threat_weight must be positive, got {}",
                self.threat_weight
            )));
        }

        for severity in Severity::all() {
            let amount = self.deductions.for_severity(*severity);
            if amount > FULL_SAFETY {
                return Err(SafetyError::Config(format!(
                    "{} deduction must be at most {}, got {}",
                    severity, FULL_SAFETY, amount
                )));
            }
        }

        Ok(())
    }

    /// Deduction for a tier.
    pub fn deduction_for(&self, severity: Severity) -> u8 {
        self.deductions.for_severity(severity)
    }
}
