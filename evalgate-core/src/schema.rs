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

//! Schema registry: declarative metric definitions.
//!
//! Definitions are loaded once at process start from a YAML source of the
//! shape `eval_types.<category>.metrics[]` and indexed by metric id. The
//! index is read-only for the process lifetime, so concurrent requests can
//! share it without synchronization. A malformed source is startup-fatal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Shape of test case a metric measures. Closed set; the adapter
/// dispatches on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestCaseKind {
    #[serde(rename = "LLMTestCase")]
    Llm,
    #[serde(rename = "ConversationalTestCase")]
    Conversational,
    #[serde(rename = "ArenaTestCase")]
    Arena,
}

/// Whether passing requires the aggregate score to meet-or-exceed or
/// meet-or-undershoot the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolarity {
    #[default]
    MinimumIsPassing,
    MaximumIsPassing,
}

/// A single metric definition from the schema source.
///
/// Immutable once loaded; identity is `metric_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Unique dotted-namespace identifier, e.g. `rag.answer_relevancy`.
    pub metric_id: String,

    /// Display name; defaults to the id when absent.
    #[serde(default)]
    pub metric_name: Option<String>,

    /// Implementation name resolved against the metric catalog.
    #[serde(rename = "metric_class")]
    pub implementation: String,

    #[serde(rename = "test_case_type")]
    pub kind: TestCaseKind,

    /// Test-case fields that must be present and non-empty.
    #[serde(rename = "required_test_case_fields", default)]
    pub required_fields: Vec<String>,

    #[serde(rename = "required_metric_init_params", default)]
    pub required_init_params: Vec<String>,

    #[serde(rename = "optional_metric_init_params", default)]
    pub optional_init_params: Vec<String>,

    #[serde(rename = "threshold_semantics", default)]
    pub polarity: ThresholdPolarity,

    /// Structural constraints, e.g. `"input must contain exactly 1 image"`.
    #[serde(default)]
    pub constraints: Vec<String>,

    /// Conditionally-required fields, `"<field> when <other_field>"`.
    #[serde(default)]
    pub conditional_fields: Vec<String>,

    #[serde(default)]
    pub notes: Vec<String>,
}

impl MetricDefinition {
    /// Display name, falling back to the metric id.
    pub fn name(&self) -> &str {
        self.metric_name.as_deref().unwrap_or(&self.metric_id)
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schema source: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate metric id in schema: {0}")]
    DuplicateMetric(String),
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    eval_types: HashMap<String, Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(default)]
    metrics: Vec<MetricDefinition>,
}

/// Load metric definitions from a YAML schema source.
///
/// Category iteration order is not meaningful; definitions are returned
/// sorted by metric id so the load is deterministic.
pub fn load_schema(path: &Path) -> Result<Vec<MetricDefinition>, SchemaError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_schema(&raw)
}

/// Parse a schema document from an in-memory string.
pub fn parse_schema(raw: &str) -> Result<Vec<MetricDefinition>, SchemaError> {
    let file: SchemaFile = serde_yaml::from_str(raw)?;
    let mut defs: Vec<MetricDefinition> = file
        .eval_types
        .into_values()
        .flat_map(|category| category.metrics)
        .collect();
    defs.sort_by(|a, b| a.metric_id.cmp(&b.metric_id));
    Ok(defs)
}

/// Build the metric-id lookup used by the orchestrator.
pub fn build_index(
    defs: Vec<MetricDefinition>,
) -> Result<HashMap<String, MetricDefinition>, SchemaError> {
    let mut index = HashMap::with_capacity(defs.len());
    for def in defs {
        if index.contains_key(&def.metric_id) {
            return Err(SchemaError::DuplicateMetric(def.metric_id));
        }
        index.insert(def.metric_id.clone(), def);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
eval_types:
  rag:
    metrics:
      - metric_id: rag.answer_relevancy
        metric_name: Answer Relevancy
        metric_class: AnswerRelevancyMetric
        test_case_type: LLMTestCase
        required_test_case_fields: [input, actual_output, retrieval_context]
        optional_metric_init_params: [model, include_reason]
  safety:
    metrics:
      - metric_id: safety.toxicity
        metric_class: ToxicityMetric
        test_case_type: LLMTestCase
        required_test_case_fields: [input, actual_output]
        optional_metric_init_params: [model]
        threshold_semantics: maximum_is_passing
"#;

    #[test]
    fn parses_categories_and_defaults() {
        let defs = parse_schema(SAMPLE).unwrap();
        assert_eq!(defs.len(), 2);

        let relevancy = &defs[0];
        assert_eq!(relevancy.metric_id, "rag.answer_relevancy");
        assert_eq!(relevancy.name(), "Answer Relevancy");
        assert_eq!(relevancy.kind, TestCaseKind::Llm);
        assert_eq!(relevancy.polarity, ThresholdPolarity::MinimumIsPassing);

        let toxicity = &defs[1];
        assert_eq!(toxicity.name(), "safety.toxicity");
        assert_eq!(toxicity.polarity, ThresholdPolarity::MaximumIsPassing);
        assert!(toxicity.required_init_params.is_empty());
    }

    #[test]
    fn missing_required_key_is_a_parse_error() {
        let raw = r#"
eval_types:
  rag:
    metrics:
      - metric_id: rag.broken
        test_case_type: LLMTestCase
"#;
        // No metric_class.
        assert!(matches!(parse_schema(raw), Err(SchemaError::Parse(_))));
    }

    #[test]
    fn unknown_test_case_kind_is_rejected() {
        let raw = r#"
eval_types:
  rag:
    metrics:
      - metric_id: rag.broken
        metric_class: SomeMetric
        test_case_type: HolographicTestCase
"#;
        assert!(matches!(parse_schema(raw), Err(SchemaError::Parse(_))));
    }

    #[test]
    fn duplicate_ids_are_rejected_at_index_time() {
        let defs = parse_schema(SAMPLE).unwrap();
        let mut doubled = defs.clone();
        doubled.extend(defs);
        match build_index(doubled) {
            Err(SchemaError::DuplicateMetric(id)) => {
                assert!(id.starts_with("rag.") || id.starts_with("safety."))
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn index_lookup_by_id() {
        let index = build_index(parse_schema(SAMPLE).unwrap()).unwrap();
        assert!(index.contains_key("safety.toxicity"));
        assert!(!index.contains_key("rag.faithfulness"));
    }
}
