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

//! In-memory backend.
//!
//! Implements the same contract as the PostgreSQL backend over keyed maps.
//! Selected by `STORAGE_BACKEND=memory`; a test and development aid, not a
//! production fallback. Tenant isolation holds by the same construction:
//! every map is keyed by user handle.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use fortunamind_core::identity::UserHandle;
use fortunamind_core::subscription::{
    RegistryError, SubscriptionRecord, SubscriptionRegistry,
};

use crate::backend::{StorageBackend, StorageError};
use crate::models::{
    EntryFilter, HealthStatus, JournalEntry, StorageRecord, UserPreference, UserStats,
};

#[derive(Default)]
pub struct MemoryStorage {
    journal: DashMap<String, Vec<JournalEntry>>,
    preferences: DashMap<String, Vec<UserPreference>>,
    records: DashMap<String, Vec<StorageRecord>>,
    subscriptions: DashMap<String, SubscriptionRecord>,
    migrated: AtomicBool,
    /// When set, every operation reports `Unavailable`. Lets tests exercise
    /// the outage paths without a database.
    fail_mode: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_mode(&self, failing: bool) {
        self.fail_mode.store(failing, Ordering::SeqCst);
    }

    pub fn insert_subscription(&self, record: SubscriptionRecord) {
        self.subscriptions.insert(record.email.clone(), record);
    }

    fn guard(&self) -> Result<(), StorageError> {
        if self.fail_mode.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("fail mode".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn store_journal_entry(
        &self,
        user_handle: &UserHandle,
        entry_text: &str,
        entry_type: &str,
        tags: &[String],
        metadata: serde_json::Value,
    ) -> Result<Uuid, StorageError> {
        self.guard()?;
        let now = Utc::now();
        let entry = JournalEntry {
            id: Uuid::new_v4(),
            user_handle: user_handle.as_str().to_string(),
            entry_text: entry_text.to_string(),
            entry_type: entry_type.to_string(),
            tags: tags.to_vec(),
            metadata,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let id = entry.id;
        self.journal
            .entry(user_handle.as_str().to_string())
            .or_default()
            .push(entry);
        Ok(id)
    }

    async fn get_journal_entries(
        &self,
        user_handle: &UserHandle,
        filter: &EntryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JournalEntry>, StorageError> {
        self.guard()?;
        let mut entries: Vec<JournalEntry> = self
            .journal
            .get(user_handle.as_str())
            .map(|e| e.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.deleted_at.is_none())
            .filter(|e| {
                filter
                    .entry_type
                    .as_ref()
                    .map_or(true, |t| &e.entry_type == t)
            })
            .filter(|e| filter.tag.as_ref().map_or(true, |t| e.tags.contains(t)))
            .filter(|e| filter.since.map_or(true, |s| e.created_at >= s))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_entry(
        &self,
        user_handle: &UserHandle,
        entry_id: Uuid,
    ) -> Result<JournalEntry, StorageError> {
        self.guard()?;
        self.journal
            .get(user_handle.as_str())
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|e| e.id == entry_id && e.deleted_at.is_none())
                    .cloned()
            })
            .ok_or(StorageError::NotFound)
    }

    async fn update_journal_entry(
        &self,
        user_handle: &UserHandle,
        entry_id: Uuid,
        entry_text: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), StorageError> {
        self.guard()?;
        let mut entries = self
            .journal
            .get_mut(user_handle.as_str())
            .ok_or(StorageError::NotFound)?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == entry_id && e.deleted_at.is_none())
            .ok_or(StorageError::NotFound)?;
        if let Some(text) = entry_text {
            entry.entry_text = text.to_string();
        }
        if let Some(metadata) = metadata {
            entry.metadata = metadata;
        }
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_journal_entry(
        &self,
        user_handle: &UserHandle,
        entry_id: Uuid,
        hard: bool,
    ) -> Result<(), StorageError> {
        self.guard()?;
        let mut entries = self
            .journal
            .get_mut(user_handle.as_str())
            .ok_or(StorageError::NotFound)?;
        if hard {
            let before = entries.len();
            entries.retain(|e| e.id != entry_id);
            if entries.len() == before {
                return Err(StorageError::NotFound);
            }
        } else {
            let entry = entries
                .iter_mut()
                .find(|e| e.id == entry_id && e.deleted_at.is_none())
                .ok_or(StorageError::NotFound)?;
            entry.deleted_at = Some(Utc::now());
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn put_preference(
        &self,
        user_handle: &UserHandle,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StorageError> {
        self.guard()?;
        let mut prefs = self
            .preferences
            .entry(user_handle.as_str().to_string())
            .or_default();
        match prefs.iter_mut().find(|p| p.key == key) {
            Some(existing) => {
                existing.value = value;
                existing.updated_at = Utc::now();
            }
            None => prefs.push(UserPreference {
                user_handle: user_handle.as_str().to_string(),
                key: key.to_string(),
                value,
                updated_at: Utc::now(),
            }),
        }
        Ok(())
    }

    async fn get_preference(
        &self,
        user_handle: &UserHandle,
        key: &str,
    ) -> Result<Option<UserPreference>, StorageError> {
        self.guard()?;
        Ok(self
            .preferences
            .get(user_handle.as_str())
            .and_then(|prefs| prefs.iter().find(|p| p.key == key).cloned()))
    }

    async fn get_preferences(
        &self,
        user_handle: &UserHandle,
    ) -> Result<Vec<UserPreference>, StorageError> {
        self.guard()?;
        let mut prefs = self
            .preferences
            .get(user_handle.as_str())
            .map(|p| p.clone())
            .unwrap_or_default();
        prefs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(prefs)
    }

    async fn put_record(
        &self,
        user_handle: &UserHandle,
        record_type: &str,
        record_key: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, StorageError> {
        self.guard()?;
        let record = StorageRecord {
            id: Uuid::new_v4(),
            user_handle: user_handle.as_str().to_string(),
            record_type: record_type.to_string(),
            record_key: record_key.to_string(),
            payload,
            created_at: Utc::now(),
        };
        let id = record.id;
        self.records
            .entry(user_handle.as_str().to_string())
            .or_default()
            .push(record);
        Ok(id)
    }

    async fn get_records(
        &self,
        user_handle: &UserHandle,
        record_type: &str,
        key_prefix: Option<&str>,
    ) -> Result<Vec<StorageRecord>, StorageError> {
        self.guard()?;
        let mut records: Vec<StorageRecord> = self
            .records
            .get(user_handle.as_str())
            .map(|r| r.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.record_type == record_type)
            .filter(|r| key_prefix.map_or(true, |p| r.record_key.starts_with(p)))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn user_stats(&self, user_handle: &UserHandle) -> Result<UserStats, StorageError> {
        self.guard()?;
        let now = Utc::now();
        let entries = self
            .journal
            .get(user_handle.as_str())
            .map(|e| e.clone())
            .unwrap_or_default();
        let live: Vec<&JournalEntry> = entries.iter().filter(|e| e.deleted_at.is_none()).collect();
        Ok(UserStats {
            entries_total: live.len() as i64,
            entries_this_month: live
                .iter()
                .filter(|e| {
                    e.created_at.year() == now.year() && e.created_at.month() == now.month()
                })
                .count() as i64,
            storage_bytes: live.iter().map(|e| e.entry_text.len() as i64).sum(),
        })
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            ok: !self.fail_mode.load(Ordering::SeqCst),
            latency_ms: 0,
        }
    }

    async fn migrate(&self) -> Result<Vec<i64>, StorageError> {
        self.guard()?;
        // Nothing to create; record the call so a second migrate applies
        // zero versions, same as the real backend.
        if self.migrated.swap(true, Ordering::SeqCst) {
            Ok(Vec::new())
        } else {
            Ok(crate::migrations::MIGRATIONS
                .iter()
                .map(|m| m.version)
                .collect())
        }
    }
}

#[async_trait]
impl SubscriptionRegistry for MemoryStorage {
    async fn find_subscription(
        &self,
        email_normalized: &str,
    ) -> Result<Option<SubscriptionRecord>, RegistryError> {
        if self.fail_mode.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("fail mode".into()));
        }
        Ok(self
            .subscriptions
            .get(email_normalized)
            .map(|r| r.clone()))
    }
}
