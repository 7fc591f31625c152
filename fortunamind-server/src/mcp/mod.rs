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

//! The MCP protocol adapter: JSON-RPC 2.0 framing over HTTP and stdio,
//! sharing one handler, one tool registry and one authentication pipeline.

pub mod handler;
pub mod http;
pub mod protocol;
pub mod stdio;

pub use handler::McpHandler;
pub use http::mcp_router;
pub use stdio::run_stdio;
