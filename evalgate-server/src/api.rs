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

//! Evaluation API endpoints.

use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use evalgate_core::response::{assemble, EvaluateResponse};
use evalgate_core::runner::{run_evaluation, EvaluateRequest, EvaluationRun};
use evalgate_core::schema::MetricDefinition;

/// POST /v1/evaluate
///
/// Runs the full orchestration pipeline. A syntactically valid request
/// always gets a response; per-metric problems surface inside
/// `metric_results`, not as HTTP errors.
pub async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, (StatusCode, String)> {
    if request.metrics.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No metrics selected.".to_string()));
    }

    let (run, results) =
        run_evaluation(&request, &state.index, &state.catalog, &state.judge).await;

    // Best-effort: a failed write must not discard computed results.
    let evidence_pointer = match state.store.persist(&run) {
        Ok(path) => Some(path.display().to_string()),
        Err(err) => {
            tracing::error!(run_id = %run.run_id, error = %err, "evidence persistence failed");
            None
        }
    };

    Ok(Json(assemble(&run.run_id, results, evidence_pointer)))
}

/// GET /v1/metrics — the metric definitions loaded at startup.
pub async fn list_metrics(State(state): State<AppState>) -> Json<Vec<MetricDefinition>> {
    let mut defs: Vec<MetricDefinition> = state.index.values().cloned().collect();
    defs.sort_by(|a, b| a.metric_id.cmp(&b.metric_id));
    Json(defs)
}

/// GET /v1/runs/:run_id — fetch a persisted evidence record.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<EvaluationRun>, (StatusCode, String)> {
    state
        .store
        .load(&run_id)
        .map(Json)
        .map_err(|_| (StatusCode::NOT_FOUND, format!("no evidence for run {run_id}")))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalgate_core::catalog::MetricCatalog;
    use evalgate_core::evidence::EvidenceStore;
    use evalgate_core::judge::JudgeConfig;
    use evalgate_core::response::OverallStatus;
    use evalgate_core::schema;
    use evalgate_core::{Measurement, Metric, MeasurementError, StructuredTestCase};
    use std::sync::Arc;

    struct FixedMetric(f64);

    #[async_trait::async_trait]
    impl Metric for FixedMetric {
        fn name(&self) -> &str {
            "FixedMetric"
        }

        async fn measure(
            &self,
            _test_case: &StructuredTestCase,
        ) -> Result<Measurement, MeasurementError> {
            Ok(Measurement {
                score: self.0,
                reason: Some("fixed".to_string()),
            })
        }
    }

    const SCHEMA: &str = r#"
eval_types:
  rag:
    metrics:
      - metric_id: rag.answer_relevancy
        metric_name: Answer Relevancy
        metric_class: FixedMetric
        test_case_type: LLMTestCase
        required_test_case_fields: [input, actual_output, retrieval_context]
"#;

    fn state(dir: &std::path::Path) -> AppState {
        let defs = schema::parse_schema(SCHEMA).unwrap();
        let index = schema::build_index(defs).unwrap();
        let mut catalog = MetricCatalog::new();
        catalog.register("FixedMetric", |_| Ok(Box::new(FixedMetric(0.85))));
        AppState {
            index: Arc::new(index),
            catalog: Arc::new(catalog),
            judge: JudgeConfig::default(),
            store: Arc::new(EvidenceStore::new(dir)),
        }
    }

    fn request_body() -> EvaluateRequest {
        serde_json::from_value(serde_json::json!({
            "evaluation_object": "chatbot",
            "use_case": "returns",
            "context": {
                "deployment_stage": "dev",
                "risk_class": "low",
                "user_impact": "customer_facing"
            },
            "run": { "mode": "one_off", "environment": "local" },
            "metrics": [
                { "metric_id": "rag.answer_relevancy", "threshold": 0.7 }
            ],
            "test_cases": [
                { "input": "Q", "actual_output": "A", "retrieval_context": ["C"] }
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn evaluate_returns_pass_and_persists_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let Json(response) = evaluate(State(state.clone()), Json(request_body()))
            .await
            .unwrap();

        assert_eq!(response.overall_status, OverallStatus::Pass);
        assert_eq!(response.metric_results[0].passed, Some(true));
        let pointer = response.evidence_pointer.unwrap();
        assert!(std::path::Path::new(&pointer).exists());

        // The persisted record is retrievable by run id.
        let Json(run) = get_run(State(state), Path(response.run_id.clone()))
            .await
            .unwrap();
        assert_eq!(run.run_id, response.run_id);
        assert_eq!(run.metric_evidence.len(), 1);
    }

    #[tokio::test]
    async fn empty_metric_list_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = request_body();
        body.metrics.clear();

        let err = evaluate(State(state(dir.path())), Json(body)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_metrics_exposes_loaded_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let Json(defs) = list_metrics(State(state(dir.path()))).await;
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].metric_id, "rag.answer_relevancy");
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = get_run(State(state(dir.path())), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
