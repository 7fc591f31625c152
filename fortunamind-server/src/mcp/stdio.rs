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

//! Stdio transport: one JSON object per line, stdin to stdout.
//!
//! Stdout belongs exclusively to JSON-RPC; logging goes to stderr.
//! Credentials are read once at process start from the environment and
//! attached to every request; there is no per-request header channel.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info};

use fortunamind_core::UpstreamCredentials;

use crate::adapter::RequestCredentials;
use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::{JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};

/// Environment variables consulted once at startup.
pub const ENV_EMAIL: &str = "FORTUNAMIND_USER_EMAIL";
pub const ENV_SUBSCRIPTION_KEY: &str = "FORTUNAMIND_SUBSCRIPTION_KEY";
pub const ENV_UPSTREAM_KEY: &str = "UPSTREAM_API_KEY";
pub const ENV_UPSTREAM_SECRET: &str = "UPSTREAM_API_SECRET";

/// Build the per-process credentials from the environment, if configured.
pub fn credentials_from_env() -> Option<RequestCredentials> {
    let email = std::env::var(ENV_EMAIL).ok()?;
    let subscription_key = std::env::var(ENV_SUBSCRIPTION_KEY).ok()?;
    let upstream = match (
        std::env::var(ENV_UPSTREAM_KEY).ok(),
        std::env::var(ENV_UPSTREAM_SECRET).ok(),
    ) {
        (Some(api_key), Some(api_secret)) => Some(UpstreamCredentials {
            api_key,
            api_secret,
        }),
        _ => None,
    };
    Some(RequestCredentials {
        email,
        subscription_key,
        upstream,
    })
}

/// Serve line-delimited JSON-RPC until EOF on stdin.
///
/// Returns `Ok(())` on clean EOF; an I/O failure on either pipe is an
/// unrecoverable downstream error and maps to exit code 2 in main.
pub async fn run_stdio(
    handler: Arc<McpHandler>,
    creds: Option<RequestCredentials>,
) -> std::io::Result<()> {
    info!(
        authenticated = creds.is_some(),
        "stdio transport ready"
    );
    serve_lines(handler, creds, tokio::io::stdin(), tokio::io::stdout()).await
}

/// The transport loop itself, generic over the pipes so tests can drive
/// it with in-memory buffers. One request line in, one response line out,
/// in order.
pub async fn serve_lines<R, W>(
    handler: Arc<McpHandler>,
    creds: Option<RequestCredentials>,
    input: R,
    output: W,
) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(input).lines();
    let mut writer = BufWriter::new(output);

    while let Some(line) = reader.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => {
                debug!(method = %request.method, "stdio request");
                handler.handle(request, creds.clone()).await
            }
            Err(e) => JsonRpcResponse::error(
                JsonRpcId::Null,
                JsonRpcError::parse_error(format!("invalid JSON: {e}")),
            ),
        };

        let mut payload = serde_json::to_vec(&response).unwrap_or_else(|_| {
            // Serialization of our own types cannot realistically fail;
            // emit a bare internal error rather than break framing.
            br#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"internal error"},"id":null}"#
                .to_vec()
        });
        payload.push(b'\n');
        writer.write_all(&payload).await?;
        writer.flush().await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PersistenceAdapter;
    use crate::tools::ToolRegistry;
    use fortunamind_core::identity::Identity;
    use fortunamind_core::subscription::{SubscriptionValidator, ValidatorConfig};
    use fortunamind_core::RateLimiter;
    use fortunamind_storage::MemoryStorage;

    fn handler() -> Arc<McpHandler> {
        let storage = Arc::new(MemoryStorage::new());
        let adapter = PersistenceAdapter::new(
            Identity::default(),
            SubscriptionValidator::new(storage.clone(), ValidatorConfig::default()),
            Arc::new(RateLimiter::new(None)),
            ToolRegistry::new(),
            storage,
        );
        Arc::new(McpHandler::new(Arc::new(adapter)))
    }

    #[tokio::test]
    async fn one_response_line_per_request_line_in_order() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
            "\n",
        );
        let mut output = std::io::Cursor::new(Vec::new());
        serve_lines(handler(), None, input.as_bytes(), &mut output)
            .await
            .unwrap();

        let output = output.into_inner();
        let lines: Vec<&str> = std::str::from_utf8(&output)
            .unwrap()
            .lines()
            .collect();
        assert_eq!(lines.len(), 3);
        let ids: Vec<i64> = lines
            .iter()
            .map(|line| {
                let response: JsonRpcResponse = serde_json::from_str(line).unwrap();
                match response.id {
                    JsonRpcId::Number(n) => n,
                    other => panic!("unexpected id: {other:?}"),
                }
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unparseable_line_yields_parse_error_with_null_id() {
        let input = "this is not json\n";
        let mut output = std::io::Cursor::new(Vec::new());
        serve_lines(handler(), None, input.as_bytes(), &mut output)
            .await
            .unwrap();

        let response: JsonRpcResponse =
            serde_json::from_slice(&output.into_inner()).unwrap();
        assert_eq!(response.id, JsonRpcId::Null);
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn blank_lines_produce_no_output() {
        let input = "\n   \n";
        let mut output = std::io::Cursor::new(Vec::new());
        serve_lines(handler(), None, input.as_bytes(), &mut output)
            .await
            .unwrap();
        assert!(output.into_inner().is_empty());
    }

    #[test]
    fn env_credentials_require_email_and_key() {
        // Serialized against other env-touching tests by the unique names.
        std::env::remove_var(ENV_EMAIL);
        std::env::remove_var(ENV_SUBSCRIPTION_KEY);
        assert!(credentials_from_env().is_none());

        std::env::set_var(ENV_EMAIL, "stdio@example.com");
        assert!(credentials_from_env().is_none());

        std::env::set_var(ENV_SUBSCRIPTION_KEY, "fm_sub_stdiotest");
        let creds = credentials_from_env().unwrap();
        assert_eq!(creds.email, "stdio@example.com");

        std::env::remove_var(ENV_EMAIL);
        std::env::remove_var(ENV_SUBSCRIPTION_KEY);
    }
}
