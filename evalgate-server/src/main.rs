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
use clap::Parser;
use evalgate_server::{config::ServerConfig, run_server};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(long, env = "EVALGATE_HTTP_ADDR")]
    http_addr: Option<String>,

    /// Metric schema YAML path (overrides config file)
    #[arg(long, env = "EVALGATE_SCHEMA_PATH")]
    schema: Option<PathBuf>,

    /// Evidence artifact directory (overrides config file)
    #[arg(long, env = "EVALGATE_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;

    if let Some(addr) = args.http_addr {
        config.server.listen_addr = addr;
    }
    if let Some(schema) = args.schema {
        config.schema.path = schema;
    }
    if let Some(artifact_dir) = args.artifact_dir {
        config.evidence.artifact_dir = artifact_dir;
    }

    run_server(config).await
}
