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

//! Stdio-to-HTTPS bridge.
//!
//! Desktop MCP clients speak line-delimited JSON-RPC on stdio; the hosted
//! server speaks HTTPS. This shim forwards each stdin line to `POST /mcp`
//! with credential headers injected from the environment, and writes the
//! response body as exactly one stdout line. One line in, one line out,
//! in order. HTTP failures become JSON-RPC errors preserving the request
//! id so the local peer never sees broken framing.
//!
//! Credential values never reach stdout or the log stream.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, error, info};

pub const ENV_SERVER_URL: &str = "FORTUNAMIND_SERVER_URL";
pub const ENV_EMAIL: &str = "FORTUNAMIND_USER_EMAIL";
pub const ENV_SUBSCRIPTION_KEY: &str = "FORTUNAMIND_SUBSCRIPTION_KEY";
pub const ENV_UPSTREAM_KEY: &str = "UPSTREAM_API_KEY";
pub const ENV_UPSTREAM_SECRET: &str = "UPSTREAM_API_SECRET";

const DEFAULT_SERVER_URL: &str = "https://persistent-mcp.fortunamind.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the bridge reads from the environment, once, at startup.
#[derive(Clone)]
pub struct BridgeConfig {
    pub server_url: String,
    pub user_email: String,
    pub subscription_key: String,
    pub upstream_api_key: Option<String>,
    pub upstream_api_secret: Option<String>,
}

impl BridgeConfig {
    /// Read configuration from the environment. Missing required variables
    /// are a startup error, reported by name (values are never echoed).
    pub fn from_env() -> Result<Self, String> {
        let (user_email, subscription_key) = match (
            std::env::var(ENV_EMAIL).ok(),
            std::env::var(ENV_SUBSCRIPTION_KEY).ok(),
        ) {
            (Some(email), Some(key)) => (email, key),
            (email, key) => {
                let mut missing = Vec::new();
                if email.is_none() {
                    missing.push(ENV_EMAIL);
                }
                if key.is_none() {
                    missing.push(ENV_SUBSCRIPTION_KEY);
                }
                return Err(format!(
                    "missing required environment variables: {}",
                    missing.join(", ")
                ));
            }
        };

        let server_url = std::env::var(ENV_SERVER_URL)
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            return Err(format!("invalid {ENV_SERVER_URL}: must be http(s)"));
        }

        Ok(Self {
            server_url: normalize_endpoint(&server_url),
            user_email,
            subscription_key,
            upstream_api_key: std::env::var(ENV_UPSTREAM_KEY).ok(),
            upstream_api_secret: std::env::var(ENV_UPSTREAM_SECRET).ok(),
        })
    }
}

/// Ensure the URL points at the `/mcp` endpoint.
pub fn normalize_endpoint(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/mcp") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/mcp")
    }
}

/// Extract the request id from a raw request line, for error responses.
/// Unparseable input yields null, matching the JSON-RPC parse-error rule.
pub fn request_id(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get("id").cloned())
        .unwrap_or(Value::Null)
}

/// Build the JSON-RPC error the local peer sees when the HTTP leg fails.
pub fn transport_error(id: Value, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": -32603, "message": message }
    })
}

pub struct Bridge {
    http: reqwest::Client,
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    /// Forward one request line; always returns a single JSON value to
    /// print, never raises past this point.
    pub async fn forward(&self, line: &str) -> Value {
        let id = request_id(line);

        let mut request = self
            .http
            .post(&self.config.server_url)
            .header("Content-Type", "application/json")
            .header("X-User-Email", &self.config.user_email)
            .header("X-Subscription-Key", &self.config.subscription_key)
            .body(line.to_string());
        if let (Some(key), Some(secret)) = (
            &self.config.upstream_api_key,
            &self.config.upstream_api_secret,
        ) {
            request = request
                .header("X-Upstream-Api-Key", key)
                .header("X-Upstream-Api-Secret", secret);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                error!("request timed out");
                return transport_error(id, "request timeout");
            }
            Err(_) => {
                error!("server unreachable");
                return transport_error(id, "server unreachable");
            }
        };

        let status = response.status();
        debug!(%status, "forwarded request");
        match response.json::<Value>().await {
            // The server answers JSON-RPC on every status it produces
            // itself (200/400/429); pass its body through verbatim.
            Ok(body) if body.get("jsonrpc").is_some() => body,
            Ok(_) | Err(_) if status.is_server_error() => {
                transport_error(id, &format!("upstream HTTP {status}"))
            }
            Ok(_) | Err(_) => transport_error(id, &format!("non JSON-RPC reply (HTTP {status})")),
        }
    }

    /// Pump stdin lines through the server until EOF. Order is preserved:
    /// requests are forwarded serially on one connection.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut reader = BufReader::new(tokio::io::stdin()).lines();
        let mut writer = BufWriter::new(tokio::io::stdout());

        info!(server = %self.config.server_url, "bridge ready");

        while let Some(line) = reader.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = self.forward(line).await;
            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            writer.write_all(&payload).await?;
            writer.flush().await?;
        }

        info!("stdin closed, bridge shutting down");
        Ok(())
    }
}
