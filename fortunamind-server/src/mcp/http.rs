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

//! HTTP transport: one JSON-RPC object per `POST /mcp`.
//!
//! Application errors ride HTTP 200 so clients only ever parse JSON-RPC;
//! the exceptions are transport-level: 400 for malformed JSON or missing
//! credentials, 413 for oversized bodies, 429 when rate limited (with a
//! `Retry-After` header).

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tracing::debug;

use fortunamind_core::UpstreamCredentials;

use crate::adapter::RequestCredentials;
use crate::api::AppState;
use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::{JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};

pub const EMAIL_HEADER: &str = "X-User-Email";
pub const SUBSCRIPTION_KEY_HEADER: &str = "X-Subscription-Key";
pub const UPSTREAM_KEY_HEADER: &str = "X-Upstream-Api-Key";
pub const UPSTREAM_SECRET_HEADER: &str = "X-Upstream-Api-Secret";

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Routes owned by the MCP transport.
pub fn mcp_router(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(mcp_endpoint))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Pull credentials out of request headers, if present.
pub fn credentials_from_headers(headers: &HeaderMap) -> Option<RequestCredentials> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let email = header(EMAIL_HEADER)?;
    let subscription_key = header(SUBSCRIPTION_KEY_HEADER)?;
    let upstream = match (header(UPSTREAM_KEY_HEADER), header(UPSTREAM_SECRET_HEADER)) {
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

async fn mcp_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Malformed JSON is a transport error: HTTP 400 carrying a JSON-RPC
    // parse-error body with a null id.
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let response = JsonRpcResponse::error(
                JsonRpcId::Null,
                JsonRpcError::parse_error(format!("invalid JSON: {e}")),
            );
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    // Structurally valid JSON that is not a request object stays at the
    // JSON-RPC layer: HTTP 200 with -32600.
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            let response = JsonRpcResponse::error(
                JsonRpcId::Null,
                JsonRpcError::invalid_request(format!("not a JSON-RPC request: {e}")),
            );
            return (StatusCode::OK, Json(response)).into_response();
        }
    };

    let creds = credentials_from_headers(&headers);
    let response = handle_with_deadline(
        &state.handler,
        request,
        creds,
        Duration::from_secs(state.request_timeout_secs),
    )
    .await;

    render(response)
}

async fn handle_with_deadline(
    handler: &Arc<McpHandler>,
    request: JsonRpcRequest,
    creds: Option<RequestCredentials>,
    deadline: Duration,
) -> JsonRpcResponse {
    let id = request.id.clone();
    let secs = deadline.as_secs();
    match tokio::time::timeout(deadline, handler.handle(request, creds)).await {
        Ok(response) => response,
        Err(_) => JsonRpcResponse::error(
            id,
            JsonRpcError::from(&fortunamind_core::ServiceError::Timeout(secs)),
        ),
    }
}

/// Map the JSON-RPC response to HTTP status and side-channel headers.
fn render(response: JsonRpcResponse) -> Response {
    let (status, retry_after) = match &response.error {
        Some(error) if error.code == -32003 => {
            let retry_after = error
                .data
                .as_ref()
                .and_then(|d| d.get("retry_after_secs"))
                .and_then(|v| v.as_u64())
                .unwrap_or(1);
            (StatusCode::TOO_MANY_REQUESTS, Some(retry_after))
        }
        Some(error) if error.code == -32001 => (StatusCode::BAD_REQUEST, None),
        _ => (StatusCode::OK, None),
    };

    let degraded = response
        .result
        .as_ref()
        .and_then(|r| r.pointer("/metadata/tool/rate_limit_degraded"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    debug!(%status, "mcp response");
    let mut http = (status, Json(response)).into_response();
    if let Some(retry_after) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            http.headers_mut().insert("Retry-After", value);
        }
    }
    if degraded {
        http.headers_mut().insert(
            "Warning",
            HeaderValue::from_static("199 - \"rate limiter degraded; read allowed\""),
        );
    }
    http
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_extraction_requires_both_required_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(EMAIL_HEADER, "user@example.com".parse().unwrap());
        assert!(credentials_from_headers(&headers).is_none());

        headers.insert(
            SUBSCRIPTION_KEY_HEADER,
            "fm_sub_headertest".parse().unwrap(),
        );
        let creds = credentials_from_headers(&headers).unwrap();
        assert_eq!(creds.email, "user@example.com");
        assert!(creds.upstream.is_none());
    }

    #[test]
    fn upstream_credentials_need_key_and_secret() {
        let mut headers = HeaderMap::new();
        headers.insert(EMAIL_HEADER, "user@example.com".parse().unwrap());
        headers.insert(
            SUBSCRIPTION_KEY_HEADER,
            "fm_sub_headertest".parse().unwrap(),
        );
        headers.insert(UPSTREAM_KEY_HEADER, "key-only".parse().unwrap());
        assert!(credentials_from_headers(&headers).unwrap().upstream.is_none());

        headers.insert(UPSTREAM_SECRET_HEADER, "secret".parse().unwrap());
        let creds = credentials_from_headers(&headers).unwrap();
        assert_eq!(creds.upstream.unwrap().api_key, "key-only");
    }

    #[test]
    fn rate_limited_responses_get_429_and_retry_after() {
        let response = JsonRpcResponse::error(
            JsonRpcId::Number(1),
            JsonRpcError::from(&fortunamind_core::ServiceError::RateLimited {
                retry_after_secs: 17,
            }),
        );
        let http = render(response);
        assert_eq!(http.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(http.headers().get("Retry-After").unwrap(), "17");
    }

    #[test]
    fn missing_credentials_render_as_400() {
        let response = JsonRpcResponse::error(
            JsonRpcId::Number(1),
            JsonRpcError::from(&fortunamind_core::ServiceError::MissingCredentials),
        );
        assert_eq!(render(response).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn application_errors_stay_http_200() {
        let response = JsonRpcResponse::error(
            JsonRpcId::Number(1),
            JsonRpcError::method_not_found("bogus"),
        );
        assert_eq!(render(response).status(), StatusCode::OK);
    }
}
