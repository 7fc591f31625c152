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

//! Trading journal tools.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use fortunamind_core::tiers::UNLIMITED;
use fortunamind_core::{AuthContext, ServiceError, Tier};
use fortunamind_storage::{EntryFilter, StorageBackend};

use super::{Permission, Tool, ToolSchema};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

pub struct StoreJournalEntryTool {
    storage: Arc<dyn StorageBackend>,
}

impl StoreJournalEntryTool {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

#[derive(Deserialize)]
struct StoreParams {
    entry_text: String,
    #[serde(default = "default_entry_type")]
    entry_type: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: Value,
}

fn default_entry_type() -> String {
    "reflection".to_string()
}

#[async_trait]
impl Tool for StoreJournalEntryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "store_journal_entry",
            description: "Store a trading journal entry for the authenticated user",
            category: "journal",
            permissions: &[Permission::Write],
            parameters: json!({
                "type": "object",
                "properties": {
                    "entry_text": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The journal entry body"
                    },
                    "entry_type": {
                        "type": "string",
                        "enum": ["trade", "analysis", "reflection", "plan"],
                        "description": "Kind of entry"
                    },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" }
                    },
                    "metadata": {
                        "type": "object",
                        "description": "Free-form structured context"
                    }
                },
                "required": ["entry_text"]
            }),
        }
    }

    async fn execute(&self, auth: &AuthContext, params: Value) -> Result<Value, ServiceError> {
        let params: StoreParams = serde_json::from_value(params)
            .map_err(|e| ServiceError::InvalidParameters(e.to_string()))?;

        let cap = auth.tier.limits().journal_entries;
        if cap != UNLIMITED {
            let stats = self.storage.user_stats(&auth.user_handle).await?;
            if stats.entries_total >= cap {
                return Err(ServiceError::Conflict(format!(
                    "journal entry limit reached for {} tier",
                    auth.tier
                )));
            }
        }

        let metadata = if params.metadata.is_null() {
            json!({})
        } else {
            params.metadata
        };
        let entry_id = self
            .storage
            .store_journal_entry(
                &auth.user_handle,
                &params.entry_text,
                &params.entry_type,
                &params.tags,
                metadata,
            )
            .await?;

        Ok(json!({ "entry_id": entry_id, "entry_type": params.entry_type }))
    }
}

pub struct GetJournalEntriesTool {
    storage: Arc<dyn StorageBackend>,
}

impl GetJournalEntriesTool {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

#[derive(Deserialize)]
struct ListParams {
    entry_type: Option<String>,
    tag: Option<String>,
    since: Option<DateTime<Utc>>,
    #[serde(default = "default_list_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_list_limit() -> i64 {
    DEFAULT_LIMIT
}

#[async_trait]
impl Tool for GetJournalEntriesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_journal_entries",
            description: "List journal entries, newest first, with optional filters",
            category: "journal",
            permissions: &[Permission::Read],
            parameters: json!({
                "type": "object",
                "properties": {
                    "entry_type": { "type": "string" },
                    "tag": { "type": "string" },
                    "since": {
                        "type": "string",
                        "format": "date-time",
                        "description": "Only entries created at or after this instant"
                    },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 200 },
                    "offset": { "type": "integer", "minimum": 0 }
                }
            }),
        }
    }

    async fn execute(&self, auth: &AuthContext, params: Value) -> Result<Value, ServiceError> {
        let params: ListParams = serde_json::from_value(params)
            .map_err(|e| ServiceError::InvalidParameters(e.to_string()))?;
        let filter = EntryFilter {
            entry_type: params.entry_type,
            tag: params.tag,
            since: params.since,
        };
        let entries = self
            .storage
            .get_journal_entries(
                &auth.user_handle,
                &filter,
                params.limit.clamp(1, MAX_LIMIT),
                params.offset.max(0),
            )
            .await?;

        Ok(json!({ "count": entries.len(), "entries": entries }))
    }
}

pub struct GetJournalEntryTool {
    storage: Arc<dyn StorageBackend>,
}

impl GetJournalEntryTool {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

#[derive(Deserialize)]
struct EntryIdParams {
    entry_id: Uuid,
}

#[async_trait]
impl Tool for GetJournalEntryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_journal_entry",
            description: "Fetch a single journal entry by id",
            category: "journal",
            permissions: &[Permission::Read],
            parameters: json!({
                "type": "object",
                "properties": {
                    "entry_id": { "type": "string", "format": "uuid" }
                },
                "required": ["entry_id"]
            }),
        }
    }

    async fn execute(&self, auth: &AuthContext, params: Value) -> Result<Value, ServiceError> {
        let params: EntryIdParams = serde_json::from_value(params)
            .map_err(|e| ServiceError::InvalidParameters(e.to_string()))?;
        let entry = self
            .storage
            .get_entry(&auth.user_handle, params.entry_id)
            .await?;
        Ok(json!({ "entry": entry }))
    }
}

pub struct UpdateJournalEntryTool {
    storage: Arc<dyn StorageBackend>,
}

impl UpdateJournalEntryTool {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

#[derive(Deserialize)]
struct UpdateParams {
    entry_id: Uuid,
    entry_text: Option<String>,
    metadata: Option<Value>,
}

#[async_trait]
impl Tool for UpdateJournalEntryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "update_journal_entry",
            description: "Replace the text and/or metadata of an existing journal entry",
            category: "journal",
            permissions: &[Permission::Write],
            parameters: json!({
                "type": "object",
                "properties": {
                    "entry_id": { "type": "string", "format": "uuid" },
                    "entry_text": { "type": "string", "minLength": 1 },
                    "metadata": { "type": "object" }
                },
                "required": ["entry_id"],
                "anyOf": [
                    { "required": ["entry_text"] },
                    { "required": ["metadata"] }
                ]
            }),
        }
    }

    async fn execute(&self, auth: &AuthContext, params: Value) -> Result<Value, ServiceError> {
        let params: UpdateParams = serde_json::from_value(params)
            .map_err(|e| ServiceError::InvalidParameters(e.to_string()))?;
        self.storage
            .update_journal_entry(
                &auth.user_handle,
                params.entry_id,
                params.entry_text.as_deref(),
                params.metadata,
            )
            .await?;
        Ok(json!({ "updated": params.entry_id }))
    }
}

pub struct DeleteJournalEntryTool {
    storage: Arc<dyn StorageBackend>,
}

impl DeleteJournalEntryTool {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for DeleteJournalEntryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "delete_journal_entry",
            description: "Delete a journal entry (soft delete below enterprise tier)",
            category: "journal",
            permissions: &[Permission::Write],
            parameters: json!({
                "type": "object",
                "properties": {
                    "entry_id": { "type": "string", "format": "uuid" }
                },
                "required": ["entry_id"]
            }),
        }
    }

    async fn execute(&self, auth: &AuthContext, params: Value) -> Result<Value, ServiceError> {
        let params: EntryIdParams = serde_json::from_value(params)
            .map_err(|e| ServiceError::InvalidParameters(e.to_string()))?;
        let hard = auth.tier == Tier::Enterprise;
        self.storage
            .delete_journal_entry(&auth.user_handle, params.entry_id, hard)
            .await?;
        Ok(json!({ "deleted": params.entry_id, "hard": hard }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fortunamind_core::identity::Identity;
    use fortunamind_storage::MemoryStorage;

    fn auth(email: &str, tier: Tier) -> AuthContext {
        AuthContext {
            user_handle: Identity::default().derive_handle(email).unwrap(),
            email_normalized: email.to_string(),
            tier,
            subscription_key: "fm_sub_journaltest".into(),
            upstream_credentials: None,
            request_id: None,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn store_then_get_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let store = StoreJournalEntryTool::new(storage.clone());
        let fetch = GetJournalEntryTool::new(storage);
        let auth = auth("journal@example.com", Tier::Premium);

        let stored = store
            .execute(
                &auth,
                json!({ "entry_text": "Sold ETH", "entry_type": "trade" }),
            )
            .await
            .unwrap();
        let entry_id = stored["entry_id"].as_str().unwrap().to_string();

        let fetched = fetch
            .execute(&auth, json!({ "entry_id": entry_id }))
            .await
            .unwrap();
        assert_eq!(fetched["entry"]["entry_text"], "Sold ETH");
    }

    #[tokio::test]
    async fn starter_cap_is_enforced() {
        let storage = Arc::new(MemoryStorage::new());
        let store = StoreJournalEntryTool::new(storage);
        let auth = auth("capped@example.com", Tier::Starter);

        let cap = Tier::Starter.limits().journal_entries;
        for i in 0..cap {
            store
                .execute(&auth, json!({ "entry_text": format!("entry {i}") }))
                .await
                .unwrap();
        }
        let err = store
            .execute(&auth, json!({ "entry_text": "one too many" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_is_soft_below_enterprise() {
        let storage = Arc::new(MemoryStorage::new());
        let store = StoreJournalEntryTool::new(storage.clone());
        let delete = DeleteJournalEntryTool::new(storage.clone());
        let premium = auth("softdel@example.com", Tier::Premium);

        let stored = store
            .execute(&premium, json!({ "entry_text": "temp" }))
            .await
            .unwrap();
        let deleted = delete
            .execute(&premium, json!({ "entry_id": stored["entry_id"] }))
            .await
            .unwrap();
        assert_eq!(deleted["hard"], false);
    }

    #[tokio::test]
    async fn missing_entry_is_not_found() {
        let storage = Arc::new(MemoryStorage::new());
        let fetch = GetJournalEntryTool::new(storage);
        let auth = auth("nf@example.com", Tier::Premium);
        let err = fetch
            .execute(&auth, json!({ "entry_id": Uuid::new_v4() }))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
