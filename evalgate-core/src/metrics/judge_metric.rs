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

//! Generic LLM-as-judge metric.

use crate::adapter::{ArenaTestCase, ConversationalTestCase, LlmTestCase, StructuredTestCase};
use crate::judge::JudgeClient;
use crate::{Measurement, MeasurementError, Metric};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

const VERDICT_INSTRUCTIONS: &str = "Respond with a single JSON object of the form \
{\"score\": <number between 0.0 and 1.0>, \"reason\": \"<one or two sentences>\"} \
and nothing else.";

/// A metric whose scoring is delegated to a judge model under a fixed
/// rubric. Each built-in implementation is one rubric instantiation.
pub struct JudgeMetric {
    name: String,
    rubric: String,
    judge: Arc<dyn JudgeClient>,
}

impl JudgeMetric {
    pub fn new(name: impl Into<String>, rubric: impl Into<String>, judge: Arc<dyn JudgeClient>) -> Self {
        Self {
            name: name.into(),
            rubric: rubric.into(),
            judge,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are an expert evaluator scoring one test case.\n\n{}\n\n{}",
            self.rubric, VERDICT_INSTRUCTIONS
        )
    }
}

#[async_trait]
impl Metric for JudgeMetric {
    fn name(&self) -> &str {
        &self.name
    }

    async fn measure(
        &self,
        test_case: &StructuredTestCase,
    ) -> Result<Measurement, MeasurementError> {
        let user = render_test_case(test_case);
        let reply = self.judge.chat(&self.system_prompt(), &user).await?;
        tracing::debug!(
            metric = %self.name,
            tokens = reply.usage.total_tokens,
            "judge verdict received"
        );
        parse_verdict(&reply.content)
    }

    fn uses_judge(&self) -> bool {
        true
    }
}

/// Render the structured test case as the judge's user prompt.
fn render_test_case(test_case: &StructuredTestCase) -> String {
    match test_case {
        StructuredTestCase::Llm(tc) => render_llm(tc),
        StructuredTestCase::Conversational(tc) => render_conversational(tc),
        StructuredTestCase::Arena(tc) => render_arena(tc),
    }
}

fn render_llm(tc: &LlmTestCase) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "INPUT:\n{}\n", tc.input);
    let _ = writeln!(prompt, "ACTUAL OUTPUT:\n{}\n", tc.actual_output);
    if let Some(expected) = &tc.expected_output {
        let _ = writeln!(prompt, "EXPECTED OUTPUT:\n{expected}\n");
    }
    if !tc.retrieval_context.is_empty() {
        let _ = writeln!(prompt, "RETRIEVAL CONTEXT:\n{}\n", tc.retrieval_context.join("\n"));
    }
    if !tc.context.is_empty() {
        let _ = writeln!(prompt, "CONTEXT:\n{}\n", tc.context.join("\n"));
    }
    if !tc.tools_called.is_empty() {
        let _ = writeln!(prompt, "TOOLS CALLED: {}\n", tc.tools_called.join(", "));
    }
    if !tc.image_inputs.is_empty() {
        let _ = writeln!(prompt, "IMAGE INPUTS: {}\n", tc.image_inputs.join(", "));
    }
    if !tc.image_outputs.is_empty() {
        let _ = writeln!(prompt, "IMAGE OUTPUTS: {}\n", tc.image_outputs.join(", "));
    }
    prompt
}

fn render_conversational(tc: &ConversationalTestCase) -> String {
    let mut prompt = String::new();
    if let Some(scenario) = &tc.scenario {
        let _ = writeln!(prompt, "SCENARIO:\n{scenario}\n");
    }
    let _ = writeln!(prompt, "CONVERSATION:");
    for turn in &tc.turns {
        let _ = writeln!(prompt, "{}: {}", turn.role, turn.content);
    }
    if let Some(outcome) = &tc.expected_outcome {
        let _ = writeln!(prompt, "\nEXPECTED OUTCOME:\n{outcome}");
    }
    prompt
}

fn render_arena(tc: &ArenaTestCase) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "INPUT:\n{}\n", tc.input);
    for (name, output) in &tc.contestants {
        let _ = writeln!(prompt, "CONTESTANT '{name}':\n{output}\n");
    }
    prompt
}

/// Parse the judge's verdict, tolerating prose around the JSON object.
/// Reasoning models in particular wrap their answer in thinking text.
fn parse_verdict(content: &str) -> Result<Measurement, MeasurementError> {
    let json = extract_json_object(content).ok_or_else(|| {
        MeasurementError::InvalidJudgeReply(format!(
            "no JSON object in judge reply: {}",
            truncate(content, 120)
        ))
    })?;

    let value: Value = serde_json::from_str(json).map_err(|e| {
        MeasurementError::InvalidJudgeReply(format!("unparseable verdict JSON: {e}"))
    })?;

    let raw_score = match &value["score"] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        MeasurementError::InvalidJudgeReply("verdict has no numeric 'score'".to_string())
    })?;

    let reason = value["reason"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(Measurement {
        score: normalize_score(raw_score),
        reason,
    })
}

/// Judges occasionally answer on a 0-10 habit despite the instructions.
fn normalize_score(raw: f64) -> f64 {
    let score = if raw > 1.0 && raw <= 10.0 { raw / 10.0 } else { raw };
    score.clamp(0.0, 1.0)
}

fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::{JudgeError, JudgeReply, TokenUsage};

    struct ScriptedJudge(String);

    #[async_trait]
    impl JudgeClient for ScriptedJudge {
        async fn chat(&self, _system: &str, _user: &str) -> Result<JudgeReply, JudgeError> {
            Ok(JudgeReply {
                content: self.0.clone(),
                usage: TokenUsage::default(),
                model: "scripted".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn cost_per_token(&self) -> (f64, f64) {
            (0.0, 0.0)
        }
    }

    fn llm_case() -> StructuredTestCase {
        StructuredTestCase::Llm(LlmTestCase {
            input: "Q".to_string(),
            actual_output: "A".to_string(),
            expected_output: None,
            context: vec![],
            retrieval_context: vec!["C".to_string()],
            tools_called: vec![],
            image_inputs: vec![],
            image_outputs: vec![],
        })
    }

    #[tokio::test]
    async fn clean_verdict_parses() {
        let metric = JudgeMetric::new(
            "AnswerRelevancyMetric",
            "Score relevancy.",
            Arc::new(ScriptedJudge(
                r#"{"score": 0.85, "reason": "on topic"}"#.to_string(),
            )),
        );
        let m = metric.measure(&llm_case()).await.unwrap();
        assert!((m.score - 0.85).abs() < 1e-9);
        assert_eq!(m.reason.as_deref(), Some("on topic"));
    }

    #[tokio::test]
    async fn verdict_wrapped_in_thinking_text_parses() {
        let metric = JudgeMetric::new(
            "AnswerRelevancyMetric",
            "Score relevancy.",
            Arc::new(ScriptedJudge(
                "<think>let me see...</think>\nHere: {\"score\": 0.4, \"reason\": \"partial\"}"
                    .to_string(),
            )),
        );
        let m = metric.measure(&llm_case()).await.unwrap();
        assert!((m.score - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ten_scale_scores_are_normalized() {
        let metric = JudgeMetric::new(
            "AnswerRelevancyMetric",
            "Score relevancy.",
            Arc::new(ScriptedJudge(r#"{"score": 8, "reason": "good"}"#.to_string())),
        );
        let m = metric.measure(&llm_case()).await.unwrap();
        assert!((m.score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_score_is_invalid_reply() {
        let metric = JudgeMetric::new(
            "AnswerRelevancyMetric",
            "Score relevancy.",
            Arc::new(ScriptedJudge(r#"{"reason": "no score here"}"#.to_string())),
        );
        assert!(matches!(
            metric.measure(&llm_case()).await,
            Err(MeasurementError::InvalidJudgeReply(_))
        ));
    }

    #[test]
    fn renders_all_llm_sections() {
        let StructuredTestCase::Llm(tc) = llm_case() else {
            unreachable!()
        };
        let rendered = render_llm(&tc);
        assert!(rendered.contains("INPUT:\nQ"));
        assert!(rendered.contains("ACTUAL OUTPUT:\nA"));
        assert!(rendered.contains("RETRIEVAL CONTEXT:\nC"));
    }
}
