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

//! Response assembly: pure derivation of the caller-facing response from
//! the run's accumulated state.

use crate::runner::MetricResult;
use serde::{Deserialize, Serialize};

/// Decision-first run status. A hard failure outranks a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Pass,
    Fail,
    Warning,
}

/// The caller-facing evaluation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub run_id: String,
    pub overall_status: OverallStatus,
    pub metric_results: Vec<MetricResult>,
    /// Storage locator of the evidence record; absent when persistence
    /// failed (results remain valid).
    pub evidence_pointer: Option<String>,
}

/// Derive the run status from individual metric outcomes: `FAIL` if any
/// executed metric failed its threshold, else `WARNING` if any metric
/// could not be evaluated, else `PASS`.
pub fn overall_status(results: &[MetricResult]) -> OverallStatus {
    let any_fail = results.iter().any(|r| r.passed == Some(false));
    let any_error = results.iter().any(|r| r.error.is_some());
    if any_fail {
        OverallStatus::Fail
    } else if any_error {
        OverallStatus::Warning
    } else {
        OverallStatus::Pass
    }
}

/// Assemble the response. Pure function of the run's accumulated state.
pub fn assemble(
    run_id: &str,
    metric_results: Vec<MetricResult>,
    evidence_pointer: Option<String>,
) -> EvaluateResponse {
    EvaluateResponse {
        run_id: run_id.to_string(),
        overall_status: overall_status(&metric_results),
        metric_results,
        evidence_pointer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing() -> MetricResult {
        MetricResult {
            metric_id: "rag.answer_relevancy".to_string(),
            metric_name: "Answer Relevancy".to_string(),
            score: Some(0.9),
            threshold: Some(0.7),
            passed: Some(true),
            reason: None,
            error: None,
            cost_signal: None,
        }
    }

    fn failing() -> MetricResult {
        MetricResult {
            passed: Some(false),
            score: Some(0.2),
            ..passing()
        }
    }

    fn errored() -> MetricResult {
        MetricResult {
            score: None,
            threshold: None,
            passed: None,
            error: Some("unknown metric_id (not found in schema)".to_string()),
            ..passing()
        }
    }

    #[test]
    fn all_passing_is_pass() {
        assert_eq!(overall_status(&[passing(), passing()]), OverallStatus::Pass);
    }

    #[test]
    fn any_failure_is_fail() {
        assert_eq!(overall_status(&[passing(), failing()]), OverallStatus::Fail);
    }

    #[test]
    fn error_without_failure_is_warning() {
        assert_eq!(
            overall_status(&[passing(), errored()]),
            OverallStatus::Warning
        );
    }

    #[test]
    fn failure_outranks_warning() {
        assert_eq!(
            overall_status(&[errored(), failing()]),
            OverallStatus::Fail
        );
    }

    #[test]
    fn empty_run_is_pass() {
        assert_eq!(overall_status(&[]), OverallStatus::Pass);
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&OverallStatus::Warning).unwrap(),
            "\"WARNING\""
        );
    }

    #[test]
    fn assemble_is_pure_echo_of_inputs() {
        let response = assemble("run-1", vec![passing()], Some("artifacts/run-1/evidence.json".to_string()));
        assert_eq!(response.run_id, "run-1");
        assert_eq!(response.overall_status, OverallStatus::Pass);
        assert_eq!(
            response.evidence_pointer.as_deref(),
            Some("artifacts/run-1/evidence.json")
        );
    }
}
