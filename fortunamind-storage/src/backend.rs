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

//! The storage backend contract.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use fortunamind_core::identity::UserHandle;
use fortunamind_core::ServiceError;

use crate::models::{
    EntryFilter, HealthStatus, JournalEntry, StorageRecord, UserPreference, UserStats,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            other => StorageError::Unavailable(other.to_string()),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => ServiceError::NotFound("record".into()),
            StorageError::Conflict(what) => ServiceError::Conflict(what),
            StorageError::Unavailable(cause) => {
                // The cause may carry connection strings; log it server-side
                // and surface a generic message.
                tracing::error!(%cause, "storage unavailable");
                ServiceError::Unavailable("storage".into())
            }
        }
    }
}

/// User-scoped record store. Every method takes the caller's handle and
/// returns only rows owned by it; cross-tenant access is impossible by
/// construction.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn store_journal_entry(
        &self,
        user_handle: &UserHandle,
        entry_text: &str,
        entry_type: &str,
        tags: &[String],
        metadata: serde_json::Value,
    ) -> Result<Uuid, StorageError>;

    async fn get_journal_entries(
        &self,
        user_handle: &UserHandle,
        filter: &EntryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JournalEntry>, StorageError>;

    async fn get_entry(
        &self,
        user_handle: &UserHandle,
        entry_id: Uuid,
    ) -> Result<JournalEntry, StorageError>;

    /// Replace an entry's text and/or metadata. Only the owning tenant's
    /// row is touched; the entry keeps its id and created_at.
    async fn update_journal_entry(
        &self,
        user_handle: &UserHandle,
        entry_id: Uuid,
        entry_text: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), StorageError>;

    /// Soft delete below the enterprise tier; hard delete for enterprise.
    async fn delete_journal_entry(
        &self,
        user_handle: &UserHandle,
        entry_id: Uuid,
        hard: bool,
    ) -> Result<(), StorageError>;

    async fn put_preference(
        &self,
        user_handle: &UserHandle,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StorageError>;

    async fn get_preference(
        &self,
        user_handle: &UserHandle,
        key: &str,
    ) -> Result<Option<UserPreference>, StorageError>;

    async fn get_preferences(
        &self,
        user_handle: &UserHandle,
    ) -> Result<Vec<UserPreference>, StorageError>;

    async fn put_record(
        &self,
        user_handle: &UserHandle,
        record_type: &str,
        record_key: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, StorageError>;

    async fn get_records(
        &self,
        user_handle: &UserHandle,
        record_type: &str,
        key_prefix: Option<&str>,
    ) -> Result<Vec<StorageRecord>, StorageError>;

    async fn user_stats(&self, user_handle: &UserHandle) -> Result<UserStats, StorageError>;

    async fn health(&self) -> HealthStatus;

    /// Apply pending schema versions. Idempotent; returns the versions
    /// applied by this call.
    async fn migrate(&self) -> Result<Vec<i64>, StorageError>;
}
