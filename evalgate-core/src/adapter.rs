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

//! Test case adapter.
//!
//! Requests carry test cases as free-form field maps. Each metric
//! definition declares which of the closed set of structured shapes its
//! implementation measures; [`adapt`] maps the known fields of the map
//! into that shape and ignores everything it does not recognize, so new
//! request fields never break older metrics.
//!
//! Missing-field errors here are defense in depth: the validation layer
//! checks the definition's required fields before adaptation is attempted.

use crate::schema::TestCaseKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A request-supplied test case: a free-form mapping of field names to
/// values. Transformed, never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCase(pub Map<String, Value>);

impl TestCase {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field value as text. Non-string scalars are rendered so callers can
    /// pass numbers or booleans where the metric expects text.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Field value as a list of strings. A bare string becomes a
    /// single-element list.
    pub fn text_list(&self, field: &str) -> Vec<String> {
        match self.0.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Whether a field is present with a usable (non-empty) value.
    pub fn has(&self, field: &str) -> bool {
        self.0.get(field).is_some_and(|v| !is_empty_value(v))
    }
}

/// Null, empty string, empty array, and empty object all count as absent.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Single-turn test case: one input, one output, optional grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmTestCase {
    pub input: String,
    pub actual_output: String,
    pub expected_output: Option<String>,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub retrieval_context: Vec<String>,
    #[serde(default)]
    pub tools_called: Vec<String>,
    #[serde(default)]
    pub image_inputs: Vec<String>,
    #[serde(default)]
    pub image_outputs: Vec<String>,
}

/// One exchange in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

/// Multi-turn test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationalTestCase {
    pub turns: Vec<Turn>,
    pub scenario: Option<String>,
    pub expected_outcome: Option<String>,
}

/// Head-to-head test case: one input, several contestant outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaTestCase {
    pub input: String,
    /// Contestant name → that contestant's output.
    pub contestants: Vec<(String, String)>,
}

/// The structured shape handed to a metric implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StructuredTestCase {
    Llm(LlmTestCase),
    Conversational(ConversationalTestCase),
    Arena(ArenaTestCase),
}

#[derive(Debug, Error)]
pub enum AdaptationError {
    #[error("field '{field}' is required to build a {kind:?} test case")]
    MissingField { kind: TestCaseKind, field: String },

    #[error("field '{field}' has the wrong shape: expected {expected}")]
    InvalidField { field: String, expected: String },
}

/// Shape a request test case for the given kind. Unknown extra fields in
/// the map are ignored.
pub fn adapt(tc: &TestCase, kind: TestCaseKind) -> Result<StructuredTestCase, AdaptationError> {
    match kind {
        TestCaseKind::Llm => adapt_llm(tc).map(StructuredTestCase::Llm),
        TestCaseKind::Conversational => {
            adapt_conversational(tc).map(StructuredTestCase::Conversational)
        }
        TestCaseKind::Arena => adapt_arena(tc).map(StructuredTestCase::Arena),
    }
}

fn require_text(tc: &TestCase, kind: TestCaseKind, field: &str) -> Result<String, AdaptationError> {
    tc.text(field)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AdaptationError::MissingField {
            kind,
            field: field.to_string(),
        })
}

fn adapt_llm(tc: &TestCase) -> Result<LlmTestCase, AdaptationError> {
    Ok(LlmTestCase {
        input: require_text(tc, TestCaseKind::Llm, "input")?,
        actual_output: require_text(tc, TestCaseKind::Llm, "actual_output")?,
        expected_output: tc.text("expected_output"),
        context: tc.text_list("context"),
        retrieval_context: tc.text_list("retrieval_context"),
        tools_called: tc.text_list("tools_called"),
        image_inputs: tc.text_list("image_inputs"),
        image_outputs: tc.text_list("image_outputs"),
    })
}

fn adapt_conversational(tc: &TestCase) -> Result<ConversationalTestCase, AdaptationError> {
    let kind = TestCaseKind::Conversational;
    let raw = tc
        .get("turns")
        .and_then(Value::as_array)
        .ok_or_else(|| AdaptationError::MissingField {
            kind,
            field: "turns".to_string(),
        })?;
    if raw.is_empty() {
        return Err(AdaptationError::MissingField {
            kind,
            field: "turns".to_string(),
        });
    }

    let mut turns = Vec::with_capacity(raw.len());
    for entry in raw {
        let obj = entry
            .as_object()
            .ok_or_else(|| AdaptationError::InvalidField {
                field: "turns".to_string(),
                expected: "a list of {role, content} objects".to_string(),
            })?;
        let role = obj.get("role").and_then(Value::as_str);
        let content = obj.get("content").and_then(Value::as_str);
        match (role, content) {
            (Some(role), Some(content)) => turns.push(Turn {
                role: role.to_string(),
                content: content.to_string(),
            }),
            _ => {
                return Err(AdaptationError::InvalidField {
                    field: "turns".to_string(),
                    expected: "each turn to carry string 'role' and 'content'".to_string(),
                })
            }
        }
    }

    Ok(ConversationalTestCase {
        turns,
        scenario: tc.text("scenario"),
        expected_outcome: tc.text("expected_outcome"),
    })
}

fn adapt_arena(tc: &TestCase) -> Result<ArenaTestCase, AdaptationError> {
    let kind = TestCaseKind::Arena;
    let input = require_text(tc, kind, "input")?;
    let raw = tc
        .get("contestants")
        .and_then(Value::as_object)
        .ok_or_else(|| AdaptationError::MissingField {
            kind,
            field: "contestants".to_string(),
        })?;
    if raw.is_empty() {
        return Err(AdaptationError::MissingField {
            kind,
            field: "contestants".to_string(),
        });
    }

    // Deterministic contestant order for reproducible judge prompts.
    let mut contestants: Vec<(String, String)> = raw
        .iter()
        .map(|(name, output)| {
            let text = match output {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), text)
        })
        .collect();
    contestants.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(ArenaTestCase { input, contestants })
}
