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

//! Tool contract and registry.
//!
//! Tools implement one async function plus a schema; the shared behavior
//! (parameter validation, permission gating, timing, the result envelope)
//! lives in the registry dispatch, not in a base type. Registration
//! happens at startup only; extension is a code change, not a runtime
//! scan.

pub mod journal;
pub mod market;
pub mod portfolio;
pub mod preferences;
pub mod stats;

use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use fortunamind_core::{AuthContext, ServiceError, Tier};

/// What a tool is allowed to do with tenant state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

/// Static description of a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub permissions: &'static [Permission],
    pub parameters: Value,
}

impl ToolSchema {
    pub fn requires_write(&self) -> bool {
        self.permissions
            .iter()
            .any(|p| matches!(p, Permission::Write | Permission::Admin))
    }
}

/// Uniform result envelope, identical across tools so the protocol
/// adapter never special-cases tool output.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub metadata: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn execute(&self, auth: &AuthContext, params: Value) -> Result<Value, ServiceError>;
}

/// Which permissions a tier grants. The free tier is read-only (it has no
/// journal persistence); enterprise additionally unlocks admin tools.
pub fn granted_permissions(tier: Tier) -> &'static [Permission] {
    match tier {
        Tier::Free => &[Permission::Read],
        Tier::Starter | Tier::Premium => &[Permission::Read, Permission::Write],
        Tier::Enterprise => &[Permission::Read, Permission::Write, Permission::Admin],
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("duplicate tool name: {0}")]
    DuplicateName(String),
    #[error("invalid parameter schema for {0}: {1}")]
    Schema(String, String),
}

/// Process-wide keyed collection of tools with compiled parameter
/// validators.
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
    validators: DashMap<String, JSONSchema>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            validators: DashMap::new(),
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RegistrationError> {
        let schema = tool.schema();
        let name = schema.name.to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistrationError::DuplicateName(name));
        }
        let validator = JSONSchema::options()
            .compile(&schema.parameters)
            .map_err(|e| RegistrationError::Schema(name.clone(), e.to_string()))?;
        self.validators.insert(name.clone(), validator);
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Snapshot of every registered schema.
    pub fn list(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .iter()
            .map(|entry| entry.value().schema())
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(b.name));
        schemas
    }

    pub fn schema_of(&self, name: &str) -> Option<ToolSchema> {
        self.tools.get(name).map(|tool| tool.schema())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Full dispatch: resolve, gate, validate, time, envelope.
    ///
    /// Pre-execution failures (unknown tool, permission, bad parameters)
    /// surface as errors; a failure inside the tool itself becomes a
    /// `success = false` envelope with a retryability marker.
    pub async fn dispatch(
        &self,
        name: &str,
        auth: &AuthContext,
        params: Value,
    ) -> Result<ToolResult, ServiceError> {
        let tool = self
            .tools
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::UnknownTool(name.to_string()))?;
        let schema = tool.schema();

        let granted = granted_permissions(auth.tier);
        if let Some(missing) = schema
            .permissions
            .iter()
            .find(|needed| !granted.contains(needed))
        {
            return Err(ServiceError::Unauthorized {
                reason: format!(
                    "tier {} lacks {:?} permission for {}",
                    auth.tier,
                    missing,
                    schema.name
                ),
                retryable: false,
            });
        }

        if let Some(validator) = self.validators.get(name) {
            if let Err(errors) = validator.validate(&params) {
                let message = errors
                    .map(|e| format!("{}: {}", e.instance_path, e))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ServiceError::InvalidParameters(message));
            }
        }

        let started = Instant::now();
        let outcome = tool.execute(auth, params).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(data) => {
                debug!(tool = name, elapsed_ms, "tool executed");
                Ok(ToolResult {
                    success: true,
                    data: Some(data),
                    error: None,
                    execution_time_ms: elapsed_ms,
                    metadata: serde_json::json!({ "category": schema.category }),
                })
            }
            Err(err) => {
                warn!(tool = name, elapsed_ms, error = %err, "tool execution failed");
                Ok(ToolResult {
                    success: false,
                    data: None,
                    error: Some(err.to_string()),
                    execution_time_ms: elapsed_ms,
                    metadata: serde_json::json!({
                        "category": schema.category,
                        "retryable": err.retryable(),
                        "code": err.json_rpc_code(),
                    }),
                })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
