// Copyright 2025 Evalgate Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Validation layer.
//!
//! Three independent checks run before a metric is resolved or measured.
//! Each returns a list of violation messages instead of failing fast, so
//! every problem with a metric selection is reported together. A non-empty
//! union fails that one metric without touching the others in the run.
//!
//! Constraint strings come from the schema in a small fixed grammar:
//!
//! - `"<field> must contain exactly N image(s)"`
//! - `"<field> must contain at most N image(s)"`
//!
//! where `input` counts against `image_inputs` and `actual_output` against
//! `image_outputs`. Conditional-field entries read
//! `"<field> when <other_field>"`: the field becomes required whenever the
//! other field is present. Anything unparseable is reported as a run gap,
//! never as a violation.

use crate::adapter::TestCase;
use crate::schema::MetricDefinition;
use serde_json::{Map, Value};

/// Outcome of the constraint check: hard violations plus anomalies the
/// run records as gaps.
#[derive(Debug, Default)]
pub struct ConstraintOutcome {
    pub violations: Vec<String>,
    pub gaps: Vec<String>,
}

/// Required and conditionally-required test-case fields.
pub fn check_required_fields(def: &MetricDefinition, tc: &TestCase) -> Vec<String> {
    let mut missing: Vec<&str> = def
        .required_fields
        .iter()
        .filter(|f| !tc.has(f))
        .map(String::as_str)
        .collect();

    for entry in &def.conditional_fields {
        if let Some((field, trigger)) = parse_conditional(entry) {
            if tc.has(trigger) && !tc.has(field) {
                missing.push(field);
            }
        }
    }

    if missing.is_empty() {
        Vec::new()
    } else {
        vec![format!(
            "{}: missing required test-case fields: {:?}",
            def.metric_id, missing
        )]
    }
}

/// Required init params, checked after judge injection. Unknown params
/// pass through untouched.
pub fn check_init_params(def: &MetricDefinition, params: &Map<String, Value>) -> Vec<String> {
    let missing: Vec<&str> = def
        .required_init_params
        .iter()
        .filter(|p| params.get(*p).map_or(true, Value::is_null))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Vec::new()
    } else {
        vec![format!(
            "{}: missing required metric init params: {:?}",
            def.metric_id, missing
        )]
    }
}

/// Structural constraints from the schema against one test case.
pub fn check_constraints(def: &MetricDefinition, tc: &TestCase) -> ConstraintOutcome {
    let mut outcome = ConstraintOutcome::default();

    for raw in &def.constraints {
        match parse_cardinality(raw) {
            Some(constraint) => {
                let images = tc.text_list(constraint.image_field);
                let ok = match constraint.bound {
                    Bound::Exactly => images.len() == constraint.count,
                    Bound::AtMost => images.len() <= constraint.count,
                };
                if !ok {
                    outcome.violations.push(format!(
                        "{}: constraint failed: {} (got {})",
                        def.metric_id,
                        raw.trim(),
                        images.len()
                    ));
                }
            }
            None => outcome.gaps.push(format!(
                "unrecognized constraint on {}: {}",
                def.metric_id,
                raw.trim()
            )),
        }
    }

    outcome
}

fn parse_conditional(entry: &str) -> Option<(&str, &str)> {
    let (field, trigger) = entry.split_once(" when ")?;
    let field = field.trim();
    let trigger = trigger.trim();
    if field.is_empty() || trigger.is_empty() {
        return None;
    }
    Some((field, trigger))
}

enum Bound {
    Exactly,
    AtMost,
}

struct CardinalityConstraint {
    image_field: &'static str,
    bound: Bound,
    count: usize,
}

fn parse_cardinality(raw: &str) -> Option<CardinalityConstraint> {
    let lower = raw.to_lowercase();
    let lower = lower.trim();
    if !lower.contains("image") {
        return None;
    }

    let image_field = if lower.starts_with("actual_output must contain") {
        "image_outputs"
    } else if lower.starts_with("input must contain") {
        "image_inputs"
    } else {
        return None;
    };

    let (bound, tail) = if let Some(tail) = lower.split_once("exactly").map(|(_, t)| t) {
        (Bound::Exactly, tail)
    } else if let Some(tail) = lower.split_once("at most").map(|(_, t)| t) {
        (Bound::AtMost, tail)
    } else {
        return None;
    };

    let count: usize = tail.split("image").next()?.trim().parse().ok()?;
    Some(CardinalityConstraint {
        image_field,
        bound,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TestCaseKind, ThresholdPolarity};
    use serde_json::json;

    fn def(required: &[&str]) -> MetricDefinition {
        MetricDefinition {
            metric_id: "rag.answer_relevancy".to_string(),
            metric_name: None,
            implementation: "AnswerRelevancyMetric".to_string(),
            kind: TestCaseKind::Llm,
            required_fields: required.iter().map(|s| s.to_string()).collect(),
            required_init_params: vec![],
            optional_init_params: vec![],
            polarity: ThresholdPolarity::MinimumIsPassing,
            constraints: vec![],
            conditional_fields: vec![],
            notes: vec![],
        }
    }

    fn case(value: serde_json::Value) -> TestCase {
        TestCase(value.as_object().cloned().unwrap())
    }

    #[test]
    fn all_missing_fields_reported_together() {
        let def = def(&["input", "actual_output", "retrieval_context"]);
        let tc = case(json!({"input": "Q"}));
        let violations = check_required_fields(&def, &tc);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("actual_output"));
        assert!(violations[0].contains("retrieval_context"));
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let def = def(&["actual_output"]);
        let tc = case(json!({"actual_output": "  "}));
        assert!(!check_required_fields(&def, &tc).is_empty());
    }

    #[test]
    fn conditional_field_required_only_when_trigger_present() {
        let mut d = def(&[]);
        d.conditional_fields = vec!["expected_output when retrieval_context".to_string()];

        let without_trigger = case(json!({"input": "Q"}));
        assert!(check_required_fields(&d, &without_trigger).is_empty());

        let with_trigger = case(json!({"retrieval_context": ["C"]}));
        let violations = check_required_fields(&d, &with_trigger);
        assert!(violations[0].contains("expected_output"));
    }

    #[test]
    fn required_init_params_post_injection() {
        let mut d = def(&[]);
        d.required_init_params = vec!["model".to_string(), "criteria".to_string()];

        let mut params = Map::new();
        params.insert("model".to_string(), json!("judge-model"));
        params.insert("something_unknown".to_string(), json!(42));

        let violations = check_init_params(&d, &params);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("criteria"));
        assert!(!violations[0].contains("something_unknown"));
    }

    #[test]
    fn exact_image_cardinality() {
        let mut d = def(&[]);
        d.constraints = vec!["input must contain exactly 1 image".to_string()];

        let ok = case(json!({"image_inputs": ["a.png"]}));
        assert!(check_constraints(&d, &ok).violations.is_empty());

        let too_many = case(json!({"image_inputs": ["a.png", "b.png"]}));
        let outcome = check_constraints(&d, &too_many);
        assert_eq!(outcome.violations.len(), 1);
        assert!(outcome.violations[0].contains("(got 2)"));
    }

    #[test]
    fn at_most_image_cardinality() {
        let mut d = def(&[]);
        d.constraints = vec!["actual_output must contain at most 2 images".to_string()];

        let ok = case(json!({"image_outputs": ["a.png"]}));
        assert!(check_constraints(&d, &ok).violations.is_empty());

        let over = case(json!({"image_outputs": ["a.png", "b.png", "c.png"]}));
        assert_eq!(check_constraints(&d, &over).violations.len(), 1);
    }

    #[test]
    fn unparseable_constraint_becomes_a_gap() {
        let mut d = def(&[]);
        d.constraints = vec!["turns must alternate roles".to_string()];
        let outcome = check_constraints(&d, &case(json!({})));
        assert!(outcome.violations.is_empty());
        assert_eq!(outcome.gaps.len(), 1);
    }
}
