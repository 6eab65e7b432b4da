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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Evalgate server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:5008")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Enable CORS (allow-all; front the server with a proxy in production)
    #[serde(default)]
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    /// Path to the metric definitions YAML source
    #[serde(default = "default_schema_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvidenceConfig {
    /// Directory evidence records are written under, one subdir per run
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

fn default_listen_addr() -> String {
    "127.0.0.1:5008".to_string()
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schemas/metrics.yaml")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: false,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: default_schema_path(),
        }
    }
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: HttpServerConfig::default(),
            schema: SchemaConfig::default(),
            evidence: EvidenceConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, or fall back to defaults when no path is
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Ok(toml::from_str(&raw)?)
            }
            None => Ok(Self::default()),
        }
    }
}
