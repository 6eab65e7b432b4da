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

//! Evaluation orchestrator.
//!
//! Per requested metric, in request order:
//! lookup → validate → resolve → instantiate → measure (one call per test
//! case, in request order) → aggregate → pass/fail. Any step can fail that
//! one metric; nothing a single metric or test case does can abort the
//! rest of the run. Evidence arrays keep one slot per test case so they
//! line up positionally with the request for audit.

use crate::adapter::{adapt, TestCase};
use crate::catalog::{MetricCatalog, MetricInit, ResolutionError};
use crate::judge::{needs_judge, JudgeConfig, OpenAiCompatClient, MODEL_PARAM};
use crate::schema::{MetricDefinition, ThresholdPolarity};
use crate::validation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Threshold applied when a selection does not carry one.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStage {
    Dev,
    Staging,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserImpact {
    Internal,
    CustomerFacing,
    Regulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Healthcare,
    Finance,
    Education,
    General,
}

/// Where and under what risk the evaluated system runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentContext {
    pub deployment_stage: DeploymentStage,
    pub risk_class: RiskClass,
    pub user_impact: UserImpact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    OneOff,
    Batch,
    Regression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnvironment {
    Local,
    Ci,
    ProductionSample,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,
}

/// Run metadata carried through to the evidence record. The budget is
/// echoed for audit, not enforced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub mode: RunMode,
    pub environment: RunEnvironment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
}

/// One requested metric: which definition, at what threshold, with which
/// constructor params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSelection {
    pub metric_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub init_params: Map<String, Value>,
}

/// A full evaluation request as handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub evaluation_object: String,
    pub use_case: String,
    pub context: DeploymentContext,
    pub run: RunSettings,
    pub metrics: Vec<MetricSelection>,
    pub test_cases: Vec<TestCase>,
}

/// Outcome of one metric over the whole test-case list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric_id: String,
    pub metric_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_signal: Option<String>,
}

/// Per-metric audit trail: one slot per test case, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvidence {
    pub metric_id: String,
    pub implementation: String,
    pub scores: Vec<Option<f64>>,
    pub reasons: Vec<Option<String>>,
}

/// A non-fatal anomaly recorded against the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapEntry {
    pub metric_id: String,
    pub gap: String,
}

/// The full run record persisted as evidence. Mutated only by the
/// orchestrator during the single request lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub evaluation_object: String,
    pub use_case: String,
    pub context: DeploymentContext,
    pub run: RunSettings,
    pub metrics: Vec<MetricSelection>,
    pub test_cases: Vec<TestCase>,
    pub metric_evidence: Vec<MetricEvidence>,
    pub gaps: Vec<GapEntry>,
}

/// Why a metric produced no score. Rendered into the result's `error`
/// field; never propagated.
#[derive(Debug, Error)]
enum MetricFailure {
    #[error("unknown metric_id (not found in schema)")]
    UnknownMetric,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    #[error("no measurable output: every test case failed to produce a score")]
    NoMeasurableOutput,
}

/// Execute a full evaluation request. Always returns a result per
/// requested metric, in request order.
pub async fn run_evaluation(
    request: &EvaluateRequest,
    index: &HashMap<String, MetricDefinition>,
    catalog: &MetricCatalog,
    judge_config: &JudgeConfig,
) -> (EvaluationRun, Vec<MetricResult>) {
    let mut run = EvaluationRun {
        run_id: uuid::Uuid::new_v4().simple().to_string(),
        started_at: Utc::now(),
        evaluation_object: request.evaluation_object.clone(),
        use_case: request.use_case.clone(),
        context: request.context.clone(),
        run: request.run.clone(),
        metrics: request.metrics.clone(),
        test_cases: request.test_cases.clone(),
        metric_evidence: Vec::new(),
        gaps: Vec::new(),
    };

    let mut results = Vec::with_capacity(request.metrics.len());

    for selection in &request.metrics {
        let result = evaluate_metric(selection, &request.test_cases, index, catalog, judge_config, &mut run)
            .await;
        results.push(result);
    }

    tracing::info!(
        run_id = %run.run_id,
        metrics = results.len(),
        gaps = run.gaps.len(),
        "evaluation run complete"
    );

    (run, results)
}

async fn evaluate_metric(
    selection: &MetricSelection,
    test_cases: &[TestCase],
    index: &HashMap<String, MetricDefinition>,
    catalog: &MetricCatalog,
    judge_config: &JudgeConfig,
    run: &mut EvaluationRun,
) -> MetricResult {
    // LOOKUP
    let Some(def) = index.get(&selection.metric_id) else {
        run.gaps.push(GapEntry {
            metric_id: selection.metric_id.clone(),
            gap: "metric_id not found in schema".to_string(),
        });
        return error_result(&selection.metric_id, &selection.metric_id, MetricFailure::UnknownMetric);
    };

    let threshold = selection.threshold.unwrap_or(DEFAULT_THRESHOLD);
    let mut init_params = selection.init_params.clone();

    // Judge injection, before validation so an injected model satisfies a
    // required `model` param. Caller-supplied model names always win.
    let judge: Option<Arc<dyn crate::judge::JudgeClient>> = if needs_judge(def, &init_params) {
        init_params.insert(MODEL_PARAM.to_string(), Value::String(judge_config.model.clone()));
        Some(Arc::new(OpenAiCompatClient::new(judge_config.clone())))
    } else if let Some(model) = init_params.get(MODEL_PARAM).and_then(Value::as_str) {
        Some(Arc::new(
            OpenAiCompatClient::new(judge_config.clone()).with_model(model.to_string()),
        ))
    } else {
        None
    };

    // VALIDATE
    let mut violations = validation::check_init_params(def, &init_params);
    for tc in test_cases {
        violations.extend(validation::check_required_fields(def, tc));
        let constraint_outcome = validation::check_constraints(def, tc);
        violations.extend(constraint_outcome.violations);
        for gap in constraint_outcome.gaps {
            let entry = GapEntry {
                metric_id: def.metric_id.clone(),
                gap,
            };
            if !run.gaps.contains(&entry) {
                run.gaps.push(entry);
            }
        }
    }
    if !violations.is_empty() {
        let mut message = violations[..violations.len().min(5)].join("; ");
        if violations.len() > 5 {
            message.push_str(" ...");
        }
        return error_result(&def.metric_id, def.name(), MetricFailure::Validation(message));
    }

    // RESOLVE + INSTANTIATE
    let init = MetricInit {
        threshold,
        init_params: init_params.clone(),
        judge,
    };
    let metric = match catalog.instantiate(&def.implementation, init) {
        Ok(metric) => metric,
        Err(err) => {
            run.gaps.push(GapEntry {
                metric_id: def.metric_id.clone(),
                gap: format!("implementation '{}' could not be constructed: {err}", def.implementation),
            });
            return error_result(&def.metric_id, def.name(), MetricFailure::Resolution(err));
        }
    };

    // MEASURE, one call per test case, in request order.
    let mut scores: Vec<Option<f64>> = Vec::with_capacity(test_cases.len());
    let mut reasons: Vec<Option<String>> = Vec::with_capacity(test_cases.len());
    for (position, tc) in test_cases.iter().enumerate() {
        let measured = match adapt(tc, def.kind) {
            Ok(shaped) => metric.measure(&shaped).await,
            Err(err) => Err(err.into()),
        };
        match measured {
            Ok(measurement) => {
                scores.push(Some(measurement.score));
                reasons.push(measurement.reason);
            }
            Err(err) => {
                tracing::warn!(
                    metric_id = %def.metric_id,
                    position,
                    error = %err,
                    "test case failed to produce a score"
                );
                scores.push(None);
                reasons.push(Some(format!("measurement failed: {err}")));
            }
        }
    }

    run.metric_evidence.push(MetricEvidence {
        metric_id: def.metric_id.clone(),
        implementation: def.implementation.clone(),
        scores: scores.clone(),
        reasons: reasons.clone(),
    });

    // AGGREGATE: mean over the scores actually obtained.
    let obtained: Vec<f64> = scores.iter().flatten().copied().collect();
    if obtained.is_empty() {
        return error_result(&def.metric_id, def.name(), MetricFailure::NoMeasurableOutput);
    }
    let mean = obtained.iter().sum::<f64>() / obtained.len() as f64;

    let passed = match def.polarity {
        ThresholdPolarity::MinimumIsPassing => mean >= threshold,
        ThresholdPolarity::MaximumIsPassing => mean <= threshold,
    };

    let reason = reasons
        .iter()
        .zip(&scores)
        .filter(|(_, score)| score.is_some())
        .filter_map(|(reason, _)| reason.clone())
        .next_back();

    let cost_signal = if init_params.contains_key(MODEL_PARAM) {
        "llm_based"
    } else {
        "deterministic_or_unknown"
    };

    MetricResult {
        metric_id: def.metric_id.clone(),
        metric_name: def.name().to_string(),
        score: Some(mean),
        threshold: Some(threshold),
        passed: Some(passed),
        reason,
        error: None,
        cost_signal: Some(cost_signal.to_string()),
    }
}

fn error_result(metric_id: &str, metric_name: &str, failure: MetricFailure) -> MetricResult {
    MetricResult {
        metric_id: metric_id.to_string(),
        metric_name: metric_name.to_string(),
        score: None,
        threshold: None,
        passed: None,
        reason: None,
        error: Some(failure.to_string()),
        cost_signal: None,
    }
}
