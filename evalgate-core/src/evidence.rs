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

//! Evidence writer.
//!
//! One structured record per run at `<artifact_dir>/<run_id>/evidence.json`.
//! The record is written to a temp file in the run directory and renamed
//! into place, so a reader querying by run id never sees a partial record.
//! Persistence is best-effort relative to the response: a write failure is
//! reported but never invalidates computed results.

use crate::runner::EvaluationRun;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write evidence: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize evidence: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable storage for run evidence, keyed by run id.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    artifact_dir: PathBuf,
}

impl EvidenceStore {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
        }
    }

    /// Location a run's evidence lives at, whether or not it exists yet.
    pub fn locator(&self, run_id: &str) -> PathBuf {
        self.artifact_dir.join(run_id).join("evidence.json")
    }

    /// Write the full run record. Returns the storage locator.
    pub fn persist(&self, run: &EvaluationRun) -> Result<PathBuf, PersistenceError> {
        let run_dir = self.artifact_dir.join(&run.run_id);
        std::fs::create_dir_all(&run_dir)?;

        let body = serde_json::to_vec_pretty(run)?;
        let final_path = run_dir.join("evidence.json");
        let tmp_path = run_dir.join("evidence.json.tmp");
        std::fs::write(&tmp_path, body)?;
        std::fs::rename(&tmp_path, &final_path)?;

        tracing::debug!(run_id = %run.run_id, path = %final_path.display(), "evidence persisted");
        Ok(final_path)
    }

    /// Read a previously persisted run back, for audit queries.
    pub fn load(&self, run_id: &str) -> Result<EvaluationRun, PersistenceError> {
        let raw = std::fs::read_to_string(self.locator(run_id))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{
        DeploymentContext, DeploymentStage, EvaluationRun, GapEntry, MetricEvidence, RiskClass,
        RunEnvironment, RunMode, RunSettings, UserImpact,
    };
    use chrono::Utc;

    fn sample_run(run_id: &str) -> EvaluationRun {
        EvaluationRun {
            run_id: run_id.to_string(),
            started_at: Utc::now(),
            evaluation_object: "chatbot".to_string(),
            use_case: "returns".to_string(),
            context: DeploymentContext {
                deployment_stage: DeploymentStage::Dev,
                risk_class: RiskClass::Low,
                user_impact: UserImpact::Internal,
                domain: None,
            },
            run: RunSettings {
                mode: RunMode::OneOff,
                environment: RunEnvironment::Local,
                baseline_run_id: None,
                budget: None,
            },
            metrics: vec![],
            test_cases: vec![],
            metric_evidence: vec![MetricEvidence {
                metric_id: "rag.answer_relevancy".to_string(),
                implementation: "AnswerRelevancyMetric".to_string(),
                scores: vec![Some(0.8), None],
                reasons: vec![Some("good".to_string()), Some("measurement failed: down".to_string())],
            }],
            gaps: vec![GapEntry {
                metric_id: "rag.answer_relevancy".to_string(),
                gap: "example".to_string(),
            }],
        }
    }

    #[test]
    fn persists_under_run_scoped_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());

        let run = sample_run("abc123");
        let path = store.persist(&run).unwrap();

        assert_eq!(path, dir.path().join("abc123").join("evidence.json"));
        assert!(path.exists());
        // No temp file is left behind.
        assert!(!dir.path().join("abc123").join("evidence.json.tmp").exists());
    }

    #[test]
    fn round_trips_the_full_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());

        let run = sample_run("roundtrip");
        store.persist(&run).unwrap();
        let loaded = store.load("roundtrip").unwrap();

        assert_eq!(loaded.run_id, "roundtrip");
        assert_eq!(loaded.metric_evidence, run.metric_evidence);
        assert_eq!(loaded.gaps, run.gaps);
    }

    #[test]
    fn same_run_under_two_ids_has_identical_metric_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());

        let first = sample_run("one");
        let mut second = sample_run("two");
        // Timestamps aside.
        second.started_at = first.started_at;

        store.persist(&first).unwrap();
        store.persist(&second).unwrap();

        let evidence_one =
            serde_json::to_vec(&store.load("one").unwrap().metric_evidence).unwrap();
        let evidence_two =
            serde_json::to_vec(&store.load("two").unwrap().metric_evidence).unwrap();
        assert_eq!(evidence_one, evidence_two);
    }

    #[test]
    fn missing_run_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        assert!(matches!(store.load("nope"), Err(PersistenceError::Io(_))));
    }
}
