//! Scoring and governance: the stateless producers of evaluation content.
//!
//! The engine signs and chains whatever these return without interpreting it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use evalseal_core::Payload;

use crate::error::InputError;

/// The four bounded scoring inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationInput {
    pub epistemic: f64,
    pub structural: f64,
    pub risk: f64,
    pub ethical: f64,
}

impl EvaluationInput {
    /// Extract and range-check the scoring fields of a request input.
    ///
    /// Other fields are ignored here; they still take part in hashing.
    pub fn from_payload(input: &Payload) -> Result<Self, InputError> {
        let map = input.as_object().ok_or(InputError::NotAnObject)?;

        let field = |name: &'static str| -> Result<f64, InputError> {
            let value = map
                .get(name)
                .filter(|v| !v.is_null())
                .ok_or(InputError::MissingField(name))?
                .as_f64()
                .ok_or(InputError::NotANumber(name))?;
            if !(0.0..=1.0).contains(&value) {
                return Err(InputError::OutOfRange { field: name, value });
            }
            Ok(value)
        };

        Ok(Self {
            epistemic: field("epistemic")?,
            structural: field("structural")?,
            risk: field("risk")?,
            ethical: field("ethical")?,
        })
    }
}

/// The scoring result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub rationality_score: f64,
}

/// Weighted score, scaled to 0..=100 and rounded to two decimals.
pub fn compute_score(input: &EvaluationInput) -> EvaluationResult {
    let raw = (0.35 * input.epistemic
        + 0.25 * input.structural
        + 0.20 * (1.0 - input.risk)
        + 0.20 * input.ethical)
        * 100.0;

    EvaluationResult {
        rationality_score: round2(raw),
    }
}

/// Round to two decimals from the exact binary value of `x`, so `2.675`
/// (stored as 2.67499...) becomes 2.67. Exact ties round away from zero.
fn round2(x: f64) -> f64 {
    let scaled = x * 100.0;
    if (x * 8.0).fract() == 0.0 && scaled.fract().abs() == 0.5 {
        return scaled.round() / 100.0;
    }
    format!("{x:.2}").parse().unwrap_or(scaled.round() / 100.0)
}

/// Coarse risk grade derived from the governance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: i64) -> Self {
        if score >= 80 {
            RiskLevel::Low
        } else if score >= 50 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// Governance verdict over a request input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceVerdict {
    pub governance_score: i64,
    pub flags: Vec<String>,
    pub risk_level: RiskLevel,
}

/// Apply the structural, consistency, and integrity rules to an input.
pub fn evaluate_governance(input: &Payload) -> GovernanceVerdict {
    let mut score: i64 = 100;
    let mut flags = Vec::new();
    let mut flag = |name: &str, penalty: i64, score: &mut i64| {
        *score -= penalty;
        flags.push(name.to_string());
    };

    let empty = serde_json::Map::new();
    let map = input.as_object().unwrap_or(&empty);
    let user = map.get("user");

    if !is_truthy(user) {
        flag("missing_user", 20, &mut score);
    }

    if map.is_empty() {
        flag("empty_payload", 50, &mut score);
    }

    if let Some(reported) = map.get("score").and_then(Value::as_f64) {
        if !(0.0..=100.0).contains(&reported) {
            flag("invalid_score_range", 30, &mut score);
        }
        if reported < 40.0 {
            flag("low_performance_indicator", 10, &mut score);
        }
    }

    if let Some(Value::String(user)) = user {
        if user.chars().count() < 3 {
            flag("weak_user_identifier", 10, &mut score);
        }
    }

    let score = score.max(0);
    GovernanceVerdict {
        governance_score: score,
        flags,
        risk_level: RiskLevel::from_score(score),
    }
}

/// Whether a field counts as present: not absent, null, false, zero, or "".
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
