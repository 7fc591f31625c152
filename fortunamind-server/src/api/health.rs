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

//! Health and status endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use super::AppState;

pub fn health_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    uptime_seconds: u64,
}

/// GET /health, the cheap liveness probe.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage_health = state.handler.adapter().storage().health().await;
    Json(HealthResponse {
        status: if storage_health.ok { "healthy" } else { "degraded" },
        timestamp: Utc::now().to_rfc3339(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    overall: &'static str,
    components: Components,
}

#[derive(Debug, Serialize)]
struct Components {
    storage: StorageComponent,
    validator: ValidatorComponent,
    rate_limiter: RateLimiterComponent,
    tool_registry: ToolRegistryComponent,
}

#[derive(Debug, Serialize)]
struct StorageComponent {
    ok: bool,
    latency_ms: u64,
}

#[derive(Debug, Serialize)]
struct ValidatorComponent {
    cached_entries: u64,
}

#[derive(Debug, Serialize)]
struct RateLimiterComponent {
    tracked_users: usize,
}

#[derive(Debug, Serialize)]
struct ToolRegistryComponent {
    registered_tools: usize,
}

/// GET /status, extended health with per-component diagnostics.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let adapter = state.handler.adapter();
    let storage_health = adapter.storage().health().await;

    Json(StatusResponse {
        overall: if storage_health.ok { "healthy" } else { "degraded" },
        components: Components {
            storage: StorageComponent {
                ok: storage_health.ok,
                latency_ms: storage_health.latency_ms,
            },
            validator: ValidatorComponent {
                cached_entries: adapter.validator().cached_entries(),
            },
            rate_limiter: RateLimiterComponent {
                tracked_users: adapter.limiter().tracked_users(),
            },
            tool_registry: ToolRegistryComponent {
                registered_tools: adapter.registry().len(),
            },
        },
    })
}
