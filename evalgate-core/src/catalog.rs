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

//! Metric catalog: implementation name → factory.
//!
//! An explicit registration table populated at startup. A definition's
//! `metric_class` is resolved here; an unknown name is a per-metric error
//! surfaced in that metric's result, never a process crash, so one bad
//! selection cannot abort the rest of the batch.

use crate::judge::JudgeClient;
use crate::Metric;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Everything a factory gets to construct a metric instance.
pub struct MetricInit {
    /// Effective threshold for this selection (already defaulted).
    pub threshold: f64,

    /// Caller init params, post judge injection.
    pub init_params: Map<String, Value>,

    /// Judge handle when the definition's model slot was filled.
    pub judge: Option<Arc<dyn JudgeClient>>,
}

impl MetricInit {
    /// String-valued init param, if present.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.init_params.get(name).and_then(Value::as_str)
    }
}

pub type MetricFactory =
    Box<dyn Fn(MetricInit) -> Result<Box<dyn Metric>, ResolutionError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("unknown metric implementation: {0}")]
    UnknownImplementation(String),

    #[error("metric construction failed: {0}")]
    Construction(String),
}

/// Registration table from implementation name to constructor.
#[derive(Default)]
pub struct MetricCatalog {
    factories: HashMap<String, MetricFactory>,
}

impl MetricCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the built-in judge-backed metrics.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        crate::metrics::register_builtins(&mut catalog);
        catalog
    }

    /// Register a factory. Replaces any previous registration of the same
    /// name, which lets tests shadow a built-in.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(MetricInit) -> Result<Box<dyn Metric>, ResolutionError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered implementation names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve and construct in one step.
    pub fn instantiate(
        &self,
        name: &str,
        init: MetricInit,
    ) -> Result<Box<dyn Metric>, ResolutionError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ResolutionError::UnknownImplementation(name.to_string()))?;
        factory(init)
    }
}
