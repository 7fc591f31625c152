// Copyright 2025 Sushanth (https://github.com/sushanthpy)
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

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use fortunamind_server::config::{ServerMode, Settings};
use fortunamind_server::{init_tracing, run_server};

#[derive(Parser, Debug)]
#[command(author, version, about = "FortunaMind Persistent MCP server", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport to serve (overrides config)
    #[arg(long, value_parser = parse_mode)]
    mode: Option<ServerMode>,

    /// Bind host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Bind port (overrides config)
    #[arg(long, env = "SERVER_PORT")]
    port: Option<u16>,
}

fn parse_mode(value: &str) -> Result<ServerMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "http" => Ok(ServerMode::Http),
        "stdio" => Ok(ServerMode::Stdio),
        other => Err(format!("unknown mode: {other} (expected http or stdio)")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(1);
        }
    };
    if let Some(mode) = args.mode {
        settings.server_mode = mode;
    }
    if let Some(host) = args.host {
        settings.server_host = host;
    }
    if let Some(port) = args.port {
        settings.server_port = port;
    }

    if let Err(e) = settings.validate() {
        eprintln!("configuration error: {e:#}");
        return ExitCode::from(1);
    }

    init_tracing(&settings);

    match run_server(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "server terminated");
            ExitCode::from(2)
        }
    }
}
