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

//! Judge-model injection and the OpenAI-compatible chat client.
//!
//! Metrics whose definitions carry a `model` init-param slot are scored by
//! an LLM judge. The injector fills that slot from [`JudgeConfig`] when the
//! caller left it empty; a caller-supplied `model` value always wins and
//! only selects a different model name on the configured endpoint.
//!
//! Constructing a client opens no connection and performs no health check.

use crate::schema::MetricDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Conventional name of the judge-model init-param slot.
pub const MODEL_PARAM: &str = "model";

const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_MODEL: &str = "deepseek-r1:1.5b";
const DEFAULT_API_KEY: &str = "ollama";

/// Judge endpoint configuration. Built once at startup (environment plus
/// defaults) and passed by reference into the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// OpenAI-compatible base URL, e.g. `http://localhost:11434/v1`.
    pub base_url: String,

    /// Default model name when a metric selection does not supply one.
    pub model: String,

    /// Bearer token. Local servers usually accept any value.
    pub api_key: String,

    pub cost_per_input_token: f64,
    pub cost_per_output_token: f64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
        }
    }
}

impl JudgeConfig {
    /// Build from `EVALGATE_JUDGE_*` environment variables, with defaults
    /// suitable for a local Ollama endpoint.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("EVALGATE_JUDGE_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("EVALGATE_JUDGE_MODEL").unwrap_or(defaults.model),
            api_key: std::env::var("EVALGATE_JUDGE_API_KEY").unwrap_or(defaults.api_key),
            cost_per_input_token: std::env::var("EVALGATE_JUDGE_COST_PER_INPUT_TOKEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cost_per_input_token),
            cost_per_output_token: std::env::var("EVALGATE_JUDGE_COST_PER_OUTPUT_TOKEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cost_per_output_token),
        }
    }
}

/// Token counts reported by the judge endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn calculate_cost(&self, cost_per_input: f64, cost_per_output: f64) -> f64 {
        (self.prompt_tokens as f64 * cost_per_input)
            + (self.completion_tokens as f64 * cost_per_output)
    }
}

/// One chat-completion reply from the judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReply {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

impl JudgeReply {
    /// Parse the reply content as JSON.
    pub fn as_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.content)
    }
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge API error: {0}")]
    Api(String),

    #[error("invalid judge response: {0}")]
    InvalidResponse(String),

    #[error("judge request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            JudgeError::Timeout
        } else {
            JudgeError::Http(err)
        }
    }
}

/// Trait for judge clients, so tests can script verdicts without a server.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// Send one system/user exchange and return the reply.
    async fn chat(&self, system: &str, user: &str) -> Result<JudgeReply, JudgeError>;

    fn model_name(&self) -> &str;

    fn cost_per_token(&self) -> (f64, f64);
}

/// Client for any OpenAI-compatible chat-completions endpoint (Ollama,
/// vLLM, OpenAI itself).
pub struct OpenAiCompatClient {
    config: JudgeConfig,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(config: JudgeConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Same endpoint, different model name. Used when a metric selection
    /// carries its own `model` init param.
    pub fn with_model(mut self, model: String) -> Self {
        self.config.model = model;
        self
    }
}

#[async_trait]
impl JudgeClient for OpenAiCompatClient {
    async fn chat(&self, system: &str, user: &str) -> Result<JudgeReply, JudgeError> {
        let request = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": 0.0
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(JudgeError::Api(error_text));
        }

        let body: Value = response.json().await?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| JudgeError::InvalidResponse("missing message content".to_string()))?
            .to_string();

        let usage_data = &body["usage"];
        let usage = TokenUsage {
            prompt_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: usage_data["total_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(JudgeReply {
            content,
            usage,
            model: self.config.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn cost_per_token(&self) -> (f64, f64) {
        (
            self.config.cost_per_input_token,
            self.config.cost_per_output_token,
        )
    }
}

/// Whether a judge model must be injected for this metric: the definition
/// exposes a `model` slot and the caller has not filled it.
pub fn needs_judge(def: &MetricDefinition, init_params: &Map<String, Value>) -> bool {
    let has_slot = def.required_init_params.iter().any(|p| p == MODEL_PARAM)
        || def.optional_init_params.iter().any(|p| p == MODEL_PARAM);
    has_slot && !init_params.contains_key(MODEL_PARAM)
}
