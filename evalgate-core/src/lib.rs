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

//! # Evalgate Core
//!
//! The metric orchestration pipeline behind the Evalgate REST façade.
//!
//! An evaluation request names an object under test, a set of metric
//! selections (id, threshold, init params), and a list of test cases.
//! The pipeline, per metric:
//!
//! 1. looks the metric up in the schema registry,
//! 2. validates test-case fields, init params, and structural constraints,
//! 3. resolves the implementation name against the metric catalog,
//! 4. injects a judge model where the definition calls for one,
//! 5. measures every test case in request order,
//! 6. aggregates scores and decides pass/fail under the definition's
//!    threshold polarity,
//!
//! and finally writes the full run as an audit evidence record. Every
//! per-metric and per-test-case failure is captured in the result rather
//! than propagated; only a malformed schema source prevents the engine
//! from serving at all.
//!
//! ## Example
//!
//! ```rust,ignore
//! use evalgate_core::{
//!     catalog::MetricCatalog, evidence::EvidenceStore, judge::JudgeConfig,
//!     response::assemble, runner::run_evaluation, schema,
//! };
//!
//! let defs = schema::load_schema("schemas/metrics.yaml".as_ref())?;
//! let index = schema::build_index(defs)?;
//! let catalog = MetricCatalog::with_builtins();
//! let judge = JudgeConfig::from_env();
//!
//! let (run, results) = run_evaluation(&request, &index, &catalog, &judge).await;
//! let pointer = EvidenceStore::new("artifacts").persist(&run).ok();
//! let response = assemble(&run.run_id, results, pointer);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod adapter;
pub mod catalog;
pub mod evidence;
pub mod judge;
pub mod metrics;
pub mod response;
pub mod runner;
pub mod schema;
pub mod validation;

pub use adapter::{StructuredTestCase, TestCase};
pub use catalog::{MetricCatalog, MetricInit, ResolutionError};
pub use judge::{JudgeClient, JudgeConfig};
pub use response::{EvaluateResponse, OverallStatus};
pub use runner::{EvaluateRequest, EvaluationRun, MetricResult};
pub use schema::{MetricDefinition, SchemaError, TestCaseKind, ThresholdPolarity};

/// A single measurement of one test case by one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// Score in `[0, 1]`.
    pub score: f64,

    /// Human-readable justification from the metric.
    pub reason: Option<String>,
}

/// Errors from a single measurement call.
///
/// Always recoverable: the orchestrator records the failure against the
/// offending test case and keeps measuring the rest.
#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error("judge call failed: {0}")]
    Judge(#[from] judge::JudgeError),

    #[error("judge reply was not a usable verdict: {0}")]
    InvalidJudgeReply(String),

    #[error("test case could not be shaped for this metric: {0}")]
    Adaptation(#[from] adapter::AdaptationError),

    #[error("measurement failed: {0}")]
    Other(String),
}

/// Core trait every metric implementation satisfies.
///
/// Implementations are constructed per run through the [`MetricCatalog`]
/// and score one structured test case per call.
#[async_trait]
pub trait Metric: Send + Sync {
    /// Implementation name, as registered in the catalog.
    fn name(&self) -> &str;

    /// Score a single test case.
    async fn measure(&self, test_case: &StructuredTestCase) -> Result<Measurement, MeasurementError>;

    /// Whether measuring calls out to a judge model.
    fn uses_judge(&self) -> bool {
        false
    }
}
