//! Prediction results and the records persisted for history views

use crate::types::request::{OwnerId, PredictionRequest};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two prediction flows, each with its own feature schema and table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    /// Age/sex/episode survival model plus severity classifier
    Survival,
    /// Eleven-vitals sepsis risk model
    SepsisRisk,
}

impl PredictionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionKind::Survival => "survival",
            PredictionKind::SepsisRisk => "sepsis_risk",
        }
    }
}

impl fmt::Display for PredictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hospital outcome predicted by the survival model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurvivalOutcome {
    Alive,
    Dead,
}

impl SurvivalOutcome {
    /// Decode the binary classifier label (1 = alive, 0 = dead)
    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            1 => Some(SurvivalOutcome::Alive),
            0 => Some(SurvivalOutcome::Dead),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SurvivalOutcome::Alive => "Alive",
            SurvivalOutcome::Dead => "Dead",
        }
    }
}

impl FromStr for SurvivalOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Alive" => Ok(SurvivalOutcome::Alive),
            "Dead" => Ok(SurvivalOutcome::Dead),
            other => Err(format!("unknown survival outcome: {other}")),
        }
    }
}

/// Severity category decoded from the severity classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Severity::Low),
            "Medium" => Ok(Severity::Medium),
            "High" => Ok(Severity::High),
            other => Err(format!("unknown severity category: {other}")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of applying the models to a feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionResult {
    Survival {
        outcome: SurvivalOutcome,
        severity: Severity,
    },
    SepsisRisk {
        is_sepsis: bool,
        /// Positive-class probability (0.0 - 1.0)
        probability: f64,
    },
}

impl PredictionResult {
    pub fn kind(&self) -> PredictionKind {
        match self {
            PredictionResult::Survival { .. } => PredictionKind::Survival,
            PredictionResult::SepsisRisk { .. } => PredictionKind::SepsisRisk,
        }
    }
}

/// A completed prediction, ready to hand to the store.
///
/// Records are append-only: nothing in the service mutates one after it
/// has been built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub owner: OwnerId,
    pub result: PredictionResult,
    /// Raw form input exactly as submitted
    pub input: PredictionRequest,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    /// Build a record stamped with the current time, at stored precision
    pub fn new(owner: OwnerId, result: PredictionResult, input: PredictionRequest) -> Self {
        Self::at(owner, result, input, Utc::now().trunc_subsecs(6))
    }

    /// Build a record with an explicit creation time
    pub fn at(
        owner: OwnerId,
        result: PredictionResult,
        input: PredictionRequest,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner,
            result,
            input,
            created_at,
        }
    }

    pub fn kind(&self) -> PredictionKind {
        self.result.kind()
    }

    /// Sepsis flag, for risk records
    pub fn is_sepsis(&self) -> Option<bool> {
        match self.result {
            PredictionResult::SepsisRisk { is_sepsis, .. } => Some(is_sepsis),
            PredictionResult::Survival { .. } => None,
        }
    }

    /// Positive-class probability, for risk records
    pub fn probability(&self) -> Option<f64> {
        match self.result {
            PredictionResult::SepsisRisk { probability, .. } => Some(probability),
            PredictionResult::Survival { .. } => None,
        }
    }
}

/// A record after the store assigned it an identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrediction {
    pub id: i64,
    #[serde(flatten)]
    pub record: PredictionRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_survival_outcome_from_label() {
        assert_eq!(SurvivalOutcome::from_label(1), Some(SurvivalOutcome::Alive));
        assert_eq!(SurvivalOutcome::from_label(0), Some(SurvivalOutcome::Dead));
        assert_eq!(SurvivalOutcome::from_label(2), None);
        assert_eq!(SurvivalOutcome::from_label(-1), None);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("Medium".parse::<Severity>(), Ok(Severity::Medium));
        assert!("medium".parse::<Severity>().is_err());
    }

    #[test]
    fn test_risk_record_accessors() {
        let record = PredictionRecord::new(
            OwnerId(7),
            PredictionResult::SepsisRisk {
                is_sepsis: true,
                probability: 0.82,
            },
            PredictionRequest::new().with("spo2", "91"),
        );

        assert_eq!(record.kind(), PredictionKind::SepsisRisk);
        assert_eq!(record.is_sepsis(), Some(true));
        assert_eq!(record.probability(), Some(0.82));
    }

    #[test]
    fn test_result_serialization_is_tagged() {
        let result = PredictionResult::Survival {
            outcome: SurvivalOutcome::Alive,
            severity: Severity::Low,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "survival");
        assert_eq!(json["outcome"], "Alive");
        assert_eq!(json["severity"], "Low");
    }
}
