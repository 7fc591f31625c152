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

//! MCP request dispatch, shared by the HTTP and stdio transports.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use fortunamind_core::{ServiceError, UpstreamCredentials};

use crate::adapter::{PersistenceAdapter, RequestCredentials};
use crate::mcp::protocol::*;
use crate::tools::ToolResult;

pub struct McpHandler {
    adapter: Arc<PersistenceAdapter>,
    server_name: String,
    server_version: String,
}

impl McpHandler {
    pub fn new(adapter: Arc<PersistenceAdapter>) -> Self {
        Self {
            adapter,
            server_name: "fortunamind-persistent-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn adapter(&self) -> &Arc<PersistenceAdapter> {
        &self.adapter
    }

    /// Handle one JSON-RPC request. `creds` carries whatever the transport
    /// extracted; methods that need authentication fail with
    /// `missing credentials` when it is absent.
    pub async fn handle(
        &self,
        request: JsonRpcRequest,
        creds: Option<RequestCredentials>,
    ) -> JsonRpcResponse {
        debug!(method = %request.method, "mcp request");

        if request.jsonrpc != JSONRPC_VERSION {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            );
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id, request.params),
            "initialized" | "notifications/initialized" => {
                JsonRpcResponse::success(request.id, json!({}))
            }
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params, creds).await,
            other => {
                warn!(method = %other, "unknown mcp method");
                JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(other))
            }
        }
    }

    /// First call of every session. Idempotent; never requires auth.
    fn handle_initialize(
        &self,
        id: JsonRpcId,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        if let Some(params) = params {
            if let Err(e) = serde_json::from_value::<InitializeParams>(params) {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("invalid initialize params: {e}")),
                );
            }
        }

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: self.server_name.clone(),
                version: self.server_version.clone(),
            },
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(_) => JsonRpcResponse::error(id, JsonRpcError::internal_error("serialization")),
        }
    }

    fn handle_tools_list(&self, id: JsonRpcId) -> JsonRpcResponse {
        let tools = self
            .adapter
            .registry()
            .list()
            .into_iter()
            .map(|schema| ToolDescriptor {
                name: schema.name.to_string(),
                description: schema.description.to_string(),
                input_schema: schema.parameters,
            })
            .collect();
        match serde_json::to_value(ListToolsResult { tools }) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(_) => JsonRpcResponse::error(id, JsonRpcError::internal_error("serialization")),
        }
    }

    async fn handle_tools_call(
        &self,
        id: JsonRpcId,
        params: Option<serde_json::Value>,
        creds: Option<RequestCredentials>,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(format!("invalid call params: {e}")),
                    )
                }
            },
            None => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("missing call params"),
                )
            }
        };

        // Header credentials win; params.auth is the fallback carrier.
        let creds = creds.or_else(|| credentials_from_params(params.auth.as_ref()));
        let Some(creds) = creds else {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::from(&ServiceError::MissingCredentials),
            );
        };

        let request_id = serde_json::to_value(&id).ok();
        match self
            .adapter
            .call_tool(&creds, &params.name, params.arguments, request_id)
            .await
        {
            Ok(result) => JsonRpcResponse::success(id, tool_result_to_mcp(result)),
            Err(err) => JsonRpcResponse::error(id, JsonRpcError::from(&err)),
        }
    }
}

/// Render the uniform tool envelope as MCP tool-call content.
fn tool_result_to_mcp(result: ToolResult) -> serde_json::Value {
    let text = match &result.data {
        Some(data) => serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()),
        None => result.error.clone().unwrap_or_default(),
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": !result.success,
        "metadata": {
            "execution_time_ms": result.execution_time_ms,
            "tool": result.metadata,
        }
    })
}

/// Read credentials out of a `params.auth` object.
fn credentials_from_params(auth: Option<&serde_json::Value>) -> Option<RequestCredentials> {
    let auth = auth?;
    let email = auth.get("email")?.as_str()?.to_string();
    let subscription_key = auth.get("subscription_key")?.as_str()?.to_string();
    let upstream = match (
        auth.get("upstream_api_key").and_then(|v| v.as_str()),
        auth.get("upstream_api_secret").and_then(|v| v.as_str()),
    ) {
        (Some(key), Some(secret)) => Some(UpstreamCredentials {
            api_key: key.to_string(),
            api_secret: secret.to_string(),
        }),
        _ => None,
    };
    Some(RequestCredentials {
        email,
        subscription_key,
        upstream,
    })
}
