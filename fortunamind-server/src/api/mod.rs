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

//! Side endpoints next to the MCP transport.

pub mod health;

use std::sync::Arc;
use std::time::Instant;

use crate::mcp::handler::McpHandler;

/// Shared state for every HTTP route.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<McpHandler>,
    pub started_at: Instant,
    pub request_timeout_secs: u64,
}

impl AppState {
    pub fn new(handler: Arc<McpHandler>, request_timeout_secs: u64) -> Self {
        Self {
            handler,
            started_at: Instant::now(),
            request_timeout_secs,
        }
    }
}
