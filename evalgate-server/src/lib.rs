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

//! REST façade over the evalgate-core orchestration pipeline.

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use evalgate_core::catalog::MetricCatalog;
use evalgate_core::evidence::EvidenceStore;
use evalgate_core::judge::JudgeConfig;
use evalgate_core::schema::{self, MetricDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub mod api;
pub mod config;

use config::ServerConfig;

/// Shared, read-only state. The schema index is built once at startup and
/// never mutated, so concurrent requests read it without synchronization.
#[derive(Clone)]
pub struct AppState {
    pub index: Arc<HashMap<String, MetricDefinition>>,
    pub catalog: Arc<MetricCatalog>,
    pub judge: JudgeConfig,
    pub store: Arc<EvidenceStore>,
}

/// Build the application router.
pub fn app(state: AppState, enable_cors: bool) -> Router {
    let router = Router::new()
        .route("/health", get(api::health))
        .route("/v1/evaluate", post(api::evaluate))
        .route("/v1/metrics", get(api::list_metrics))
        .route("/v1/runs/:run_id", get(api::get_run))
        .with_state(state);

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evalgate_server=info,evalgate_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Evalgate server");

    // Schema load is the one startup-fatal failure mode.
    let defs = schema::load_schema(&config.schema.path)
        .with_context(|| format!("loading metric schema from {}", config.schema.path.display()))?;
    tracing::info!(metrics = defs.len(), "metric schema loaded");
    let index = schema::build_index(defs).context("indexing metric schema")?;

    let judge = JudgeConfig::from_env();
    tracing::info!(base_url = %judge.base_url, model = %judge.model, "judge endpoint configured");

    let state = AppState {
        index: Arc::new(index),
        catalog: Arc::new(MetricCatalog::with_builtins()),
        judge,
        store: Arc::new(EvidenceStore::new(&config.evidence.artifact_dir)),
    };

    let app = app(state, config.server.enable_cors);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    tracing::info!("HTTP API listening on http://{}", config.server.listen_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
