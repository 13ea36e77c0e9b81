//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{json, Map, Number, Value};

use evalseal_core::Payload;

/// A float with a short exact decimal form, so it survives a JSON text round trip.
pub fn short_float() -> impl Strategy<Value = f64> {
    (-80_000i32..80_000).prop_map(|n| f64::from(n) / 8.0)
}

/// A JSON scalar.
pub fn json_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        short_float().prop_filter_map("finite", |f| Number::from_f64(f).map(Value::Number)),
        "[a-zA-Z0-9 _-]{0,12}".prop_map(Value::String),
    ]
}

/// An arbitrary JSON value, nested a few levels deep.
pub fn json_value() -> impl Strategy<Value = Value> {
    json_scalar().prop_recursive(3, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
        ]
    })
}

/// An arbitrary JSON object.
pub fn json_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z_]{1,8}", json_value(), 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

/// A value in the closed unit interval.
pub fn unit_interval() -> impl Strategy<Value = f64> {
    0.0f64..=1.0
}

/// A nonce accepted by the default replay settings.
pub fn nonce() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{16,64}"
}

/// A key id.
pub fn key_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,11}"
}

/// A non-empty secret.
pub fn secret() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

/// Parameters for a scoreable input.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringParams {
    pub epistemic: f64,
    pub structural: f64,
    pub risk: f64,
    pub ethical: f64,
    pub user: Option<String>,
    pub score: Option<i64>,
}

impl ScoringParams {
    /// The request input these parameters describe.
    pub fn to_payload(&self) -> Payload {
        let mut input = json!({
            "epistemic": self.epistemic,
            "structural": self.structural,
            "risk": self.risk,
            "ethical": self.ethical,
        });
        if let Some(user) = &self.user {
            input["user"] = json!(user);
        }
        if let Some(score) = self.score {
            input["score"] = json!(score);
        }
        input
    }
}

impl Arbitrary for ScoringParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            unit_interval(),
            unit_interval(),
            unit_interval(),
            unit_interval(),
            proptest::option::of("[a-z]{0,8}"),
            proptest::option::of(-50i64..=150),
        )
            .prop_map(|(epistemic, structural, risk, ethical, user, score)| ScoringParams {
                epistemic,
                structural,
                risk,
                ethical,
                user,
                score,
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalseal::{compute_score, evaluate_governance, EvaluationInput};
    use evalseal_core::canonicalize;

    proptest! {
        #[test]
        fn test_canonical_bytes_survive_json_text(value in json_value()) {
            let text = serde_json::to_string(&value).unwrap();
            let reparsed: Value = serde_json::from_str(&text).unwrap();

            prop_assert_eq!(canonicalize(&value).unwrap(), canonicalize(&reparsed).unwrap());
        }

        #[test]
        fn test_score_stays_in_range(params: ScoringParams) {
            let input = EvaluationInput::from_payload(&params.to_payload()).unwrap();
            let score = compute_score(&input).rationality_score;

            prop_assert!((0.0..=100.0).contains(&score));
            prop_assert!((score * 100.0 - (score * 100.0).round()).abs() < 1e-6);
        }

        #[test]
        fn test_governance_bounded(params: ScoringParams) {
            let verdict = evaluate_governance(&params.to_payload());
            prop_assert!((0..=100).contains(&verdict.governance_score));
        }

        #[test]
        fn test_objects_canonicalize(value in json_object()) {
            prop_assert!(canonicalize(&value).is_ok());
        }
    }
}
