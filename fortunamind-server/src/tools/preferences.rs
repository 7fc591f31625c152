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

//! User preference tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use fortunamind_core::{AuthContext, ServiceError};
use fortunamind_storage::StorageBackend;

use super::{Permission, Tool, ToolSchema};

pub struct SetPreferenceTool {
    storage: Arc<dyn StorageBackend>,
}

impl SetPreferenceTool {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

#[derive(Deserialize)]
struct SetParams {
    key: String,
    value: Value,
}

#[async_trait]
impl Tool for SetPreferenceTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "set_preference",
            description: "Store a user preference (upsert by key)",
            category: "preferences",
            permissions: &[Permission::Write],
            parameters: json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string", "minLength": 1, "maxLength": 255 },
                    "value": { "description": "Any JSON value" }
                },
                "required": ["key", "value"]
            }),
        }
    }

    async fn execute(&self, auth: &AuthContext, params: Value) -> Result<Value, ServiceError> {
        let params: SetParams = serde_json::from_value(params)
            .map_err(|e| ServiceError::InvalidParameters(e.to_string()))?;
        self.storage
            .put_preference(&auth.user_handle, &params.key, params.value)
            .await?;
        Ok(json!({ "stored": params.key }))
    }
}

pub struct GetPreferenceTool {
    storage: Arc<dyn StorageBackend>,
}

impl GetPreferenceTool {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

#[derive(Deserialize)]
struct GetParams {
    key: Option<String>,
}

#[async_trait]
impl Tool for GetPreferenceTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_preference",
            description: "Fetch one preference by key, or all preferences when no key is given",
            category: "preferences",
            permissions: &[Permission::Read],
            parameters: json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string" }
                }
            }),
        }
    }

    async fn execute(&self, auth: &AuthContext, params: Value) -> Result<Value, ServiceError> {
        let params: GetParams = serde_json::from_value(params)
            .map_err(|e| ServiceError::InvalidParameters(e.to_string()))?;
        match params.key {
            Some(key) => {
                let pref = self.storage.get_preference(&auth.user_handle, &key).await?;
                Ok(json!({
                    "key": key,
                    "value": pref.map(|p| p.value),
                }))
            }
            None => {
                let prefs = self.storage.get_preferences(&auth.user_handle).await?;
                let map: serde_json::Map<String, Value> = prefs
                    .into_iter()
                    .map(|p| (p.key, p.value))
                    .collect();
                Ok(json!({ "preferences": map }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fortunamind_core::identity::Identity;
    use fortunamind_core::Tier;
    use fortunamind_storage::MemoryStorage;

    fn auth() -> AuthContext {
        AuthContext {
            user_handle: Identity::default()
                .derive_handle("prefs-tool@example.com")
                .unwrap(),
            email_normalized: "prefs-tool@example.com".into(),
            tier: Tier::Premium,
            subscription_key: "fm_sub_preftester".into(),
            upstream_credentials: None,
            request_id: None,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let set = SetPreferenceTool::new(storage.clone());
        let get = GetPreferenceTool::new(storage);
        let auth = auth();

        set.execute(
            &auth,
            json!({ "key": "risk_profile", "value": { "max_position": 0.05 } }),
        )
        .await
        .unwrap();

        let fetched = get
            .execute(&auth, json!({ "key": "risk_profile" }))
            .await
            .unwrap();
        assert_eq!(fetched["value"]["max_position"], 0.05);

        let all = get.execute(&auth, json!({})).await.unwrap();
        assert!(all["preferences"].get("risk_profile").is_some());
    }

    #[tokio::test]
    async fn missing_preference_is_null_not_error() {
        let storage = Arc::new(MemoryStorage::new());
        let get = GetPreferenceTool::new(storage);
        let fetched = get
            .execute(&auth(), json!({ "key": "absent" }))
            .await
            .unwrap();
        assert!(fetched["value"].is_null());
    }
}
