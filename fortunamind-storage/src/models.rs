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

//! Storage row types. All timestamps are UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One journal entry. `entry_type` is a small-cardinality free-form tag
/// such as `trade`, `analysis` or `reflection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub user_handle: String,
    pub entry_text: String,
    pub entry_type: String,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; purged later by the retention job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Filter for journal listing. All fields are conjunctive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryFilter {
    pub entry_type: Option<String>,
    pub tag: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_handle: String,
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Generic extension record, keyed by `(record_type, record_key)` within a
/// tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRecord {
    pub id: Uuid,
    pub user_handle: String,
    pub record_type: String,
    pub record_key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub entries_total: i64,
    pub entries_this_month: i64,
    pub storage_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub latency_ms: u64,
}
