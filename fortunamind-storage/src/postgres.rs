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

//! PostgreSQL backend.
//!
//! Tenant isolation is enforced twice: every statement carries an explicit
//! `user_handle` predicate, and every transaction sets the
//! transaction-local `app.user_handle` variable that the row-level-security
//! policies check independently. `set_config(..., true)` scopes the value
//! to the transaction, so a pooled connection returns to the pool with no
//! tenant context attached.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use fortunamind_core::identity::UserHandle;
use fortunamind_core::subscription::{
    RegistryError, SubscriptionRecord, SubscriptionRegistry, SubscriptionStatus,
};
use fortunamind_core::tiers::Tier;

use crate::backend::{StorageBackend, StorageError};
use crate::migrations::MIGRATIONS;
use crate::models::{
    EntryFilter, HealthStatus, JournalEntry, StorageRecord, UserPreference, UserStats,
};

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to the database. Does not run migrations; callers invoke
    /// [`StorageBackend::migrate`] before serving traffic.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;
        info!(max_connections = MAX_CONNECTIONS, "connected to postgres");
        Ok(Self { pool })
    }

    /// Begin a transaction scoped to one tenant. The session variable is
    /// transaction-local and evaporates at commit or rollback.
    async fn begin_scoped(
        &self,
        user_handle: &UserHandle,
    ) -> Result<Transaction<'_, Postgres>, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('app.user_handle', $1, true)")
            .bind(user_handle.as_str())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Insert or update the subscription row for a normalized email.
    /// Administrative path; normal request handling never writes here.
    pub async fn upsert_subscription(
        &self,
        record: &SubscriptionRecord,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO user_subscriptions (email, subscription_key, tier, status, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE SET
                subscription_key = EXCLUDED.subscription_key,
                tier = EXCLUDED.tier,
                status = EXCLUDED.status,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(&record.email)
        .bind(&record.subscription_key)
        .bind(record.tier.as_str())
        .bind(record.status.as_str())
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<JournalEntry, StorageError> {
        Ok(JournalEntry {
            id: row.try_get("id")?,
            user_handle: row.try_get("user_handle")?,
            entry_text: row.try_get("entry_text")?,
            entry_type: row.try_get("entry_type")?,
            tags: row.try_get("tags")?,
            metadata: row
                .try_get::<Option<serde_json::Value>, _>("metadata")?
                .unwrap_or_else(|| serde_json::json!({})),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

#[async_trait]
impl StorageBackend for PostgresStorage {
    async fn store_journal_entry(
        &self,
        user_handle: &UserHandle,
        entry_text: &str,
        entry_type: &str,
        tags: &[String],
        metadata: serde_json::Value,
    ) -> Result<Uuid, StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO journal_entries (user_handle, entry_text, entry_type, tags, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(user_handle.as_str())
        .bind(entry_text)
        .bind(entry_type)
        .bind(tags)
        .bind(&metadata)
        .fetch_one(&mut *tx)
        .await?
        .try_get("id")?;
        tx.commit().await?;
        debug!(user = %prefix(user_handle), entry_id = %id, "journal entry stored");
        Ok(id)
    }

    async fn get_journal_entries(
        &self,
        user_handle: &UserHandle,
        filter: &EntryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JournalEntry>, StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let rows = sqlx::query(
            r#"
            SELECT id, user_handle, entry_text, entry_type, tags, metadata,
                   created_at, updated_at, deleted_at
            FROM journal_entries
            WHERE user_handle = $1
              AND deleted_at IS NULL
              AND ($2::text IS NULL OR entry_type = $2)
              AND ($3::text IS NULL OR $3 = ANY(tags))
              AND ($4::timestamptz IS NULL OR created_at >= $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(user_handle.as_str())
        .bind(filter.entry_type.as_deref())
        .bind(filter.tag.as_deref())
        .bind(filter.since)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn get_entry(
        &self,
        user_handle: &UserHandle,
        entry_id: Uuid,
    ) -> Result<JournalEntry, StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let row = sqlx::query(
            r#"
            SELECT id, user_handle, entry_text, entry_type, tags, metadata,
                   created_at, updated_at, deleted_at
            FROM journal_entries
            WHERE user_handle = $1 AND id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(user_handle.as_str())
        .bind(entry_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        row.as_ref()
            .map(Self::entry_from_row)
            .transpose()?
            .ok_or(StorageError::NotFound)
    }

    async fn update_journal_entry(
        &self,
        user_handle: &UserHandle,
        entry_id: Uuid,
        entry_text: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let affected = sqlx::query(
            r#"
            UPDATE journal_entries SET
                entry_text = COALESCE($3, entry_text),
                metadata = COALESCE($4, metadata),
                updated_at = NOW()
            WHERE user_handle = $1 AND id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(user_handle.as_str())
        .bind(entry_id)
        .bind(entry_text)
        .bind(metadata)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        if affected == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_journal_entry(
        &self,
        user_handle: &UserHandle,
        entry_id: Uuid,
        hard: bool,
    ) -> Result<(), StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let affected = if hard {
            sqlx::query("DELETE FROM journal_entries WHERE user_handle = $1 AND id = $2")
                .bind(user_handle.as_str())
                .bind(entry_id)
                .execute(&mut *tx)
                .await?
                .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE journal_entries SET deleted_at = NOW(), updated_at = NOW()
                WHERE user_handle = $1 AND id = $2 AND deleted_at IS NULL
                "#,
            )
            .bind(user_handle.as_str())
            .bind(entry_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        };
        tx.commit().await?;

        if affected == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn put_preference(
        &self,
        user_handle: &UserHandle,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_handle, preference_key, preference_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_handle, preference_key) DO UPDATE SET
                preference_value = EXCLUDED.preference_value,
                updated_at = NOW()
            "#,
        )
        .bind(user_handle.as_str())
        .bind(key)
        .bind(&value)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_preference(
        &self,
        user_handle: &UserHandle,
        key: &str,
    ) -> Result<Option<UserPreference>, StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let row = sqlx::query(
            r#"
            SELECT user_handle, preference_key, preference_value, updated_at
            FROM user_preferences
            WHERE user_handle = $1 AND preference_key = $2
            "#,
        )
        .bind(user_handle.as_str())
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        row.map(|row| {
            Ok(UserPreference {
                user_handle: row.try_get("user_handle")?,
                key: row.try_get("preference_key")?,
                value: row
                    .try_get::<Option<serde_json::Value>, _>("preference_value")?
                    .unwrap_or(serde_json::Value::Null),
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn get_preferences(
        &self,
        user_handle: &UserHandle,
    ) -> Result<Vec<UserPreference>, StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let rows = sqlx::query(
            r#"
            SELECT user_handle, preference_key, preference_value, updated_at
            FROM user_preferences
            WHERE user_handle = $1
            ORDER BY preference_key
            "#,
        )
        .bind(user_handle.as_str())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.into_iter()
            .map(|row| {
                Ok(UserPreference {
                    user_handle: row.try_get("user_handle")?,
                    key: row.try_get("preference_key")?,
                    value: row
                        .try_get::<Option<serde_json::Value>, _>("preference_value")?
                        .unwrap_or(serde_json::Value::Null),
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    async fn put_record(
        &self,
        user_handle: &UserHandle,
        record_type: &str,
        record_key: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO storage_records (user_handle, record_type, record_key, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_handle.as_str())
        .bind(record_type)
        .bind(record_key)
        .bind(&payload)
        .fetch_one(&mut *tx)
        .await?
        .try_get("id")?;
        tx.commit().await?;
        Ok(id)
    }

    async fn get_records(
        &self,
        user_handle: &UserHandle,
        record_type: &str,
        key_prefix: Option<&str>,
    ) -> Result<Vec<StorageRecord>, StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let rows = sqlx::query(
            r#"
            SELECT id, user_handle, record_type, record_key, payload, created_at
            FROM storage_records
            WHERE user_handle = $1
              AND record_type = $2
              AND ($3::text IS NULL OR record_key LIKE $3 || '%')
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_handle.as_str())
        .bind(record_type)
        .bind(key_prefix)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.into_iter()
            .map(|row| {
                Ok(StorageRecord {
                    id: row.try_get("id")?,
                    user_handle: row.try_get("user_handle")?,
                    record_type: row.try_get("record_type")?,
                    record_key: row.try_get("record_key")?,
                    payload: row.try_get("payload")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn user_stats(&self, user_handle: &UserHandle) -> Result<UserStats, StorageError> {
        let mut tx = self.begin_scoped(user_handle).await?;
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS entries_total,
                COUNT(*) FILTER (WHERE created_at >= date_trunc('month', NOW()))
                    AS entries_this_month,
                COALESCE(SUM(octet_length(entry_text)), 0) AS storage_bytes
            FROM journal_entries
            WHERE user_handle = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_handle.as_str())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(UserStats {
            entries_total: row.try_get("entries_total")?,
            entries_this_month: row.try_get("entries_this_month")?,
            storage_bytes: row.try_get("storage_bytes")?,
        })
    }

    async fn health(&self) -> HealthStatus {
        let started = Instant::now();
        let ok = sqlx::query("SELECT 1").execute(&self.pool).await.is_ok();
        HealthStatus {
            ok,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn migrate(&self) -> Result<Vec<i64>, StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let applied: Vec<i64> = sqlx::query("SELECT version FROM schema_migrations")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.try_get("version"))
            .collect::<Result<_, sqlx::Error>>()?;

        let mut newly_applied = Vec::new();
        for migration in MIGRATIONS {
            if applied.contains(&migration.version) {
                continue;
            }
            let mut tx = self.pool.begin().await?;
            for statement in migration.statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(version = migration.version, name = migration.name, "migration applied");
            newly_applied.push(migration.version);
        }
        Ok(newly_applied)
    }
}

#[async_trait]
impl SubscriptionRegistry for PostgresStorage {
    async fn find_subscription(
        &self,
        email_normalized: &str,
    ) -> Result<Option<SubscriptionRecord>, RegistryError> {
        let row = sqlx::query(
            r#"
            SELECT email, subscription_key, tier, status, expires_at, created_at, updated_at
            FROM user_subscriptions
            WHERE email = $1
            "#,
        )
        .bind(email_normalized)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tier: String = row
            .try_get("tier")
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        let status: String = row
            .try_get("status")
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        let read = |e: sqlx::Error| RegistryError::Unavailable(e.to_string());
        Ok(Some(SubscriptionRecord {
            email: row.try_get("email").map_err(read)?,
            subscription_key: row
                .try_get::<Option<String>, _>("subscription_key")
                .map_err(read)?
                .unwrap_or_default(),
            tier: Tier::parse(&tier).unwrap_or(Tier::Free),
            status: SubscriptionStatus::parse(&status).unwrap_or(SubscriptionStatus::Revoked),
            expires_at: row
                .try_get::<Option<DateTime<Utc>>, _>("expires_at")
                .map_err(read)?,
            created_at: row.try_get("created_at").map_err(read)?,
            updated_at: row.try_get("updated_at").map_err(read)?,
        }))
    }
}

fn prefix(handle: &UserHandle) -> &str {
    &handle.as_str()[..handle.as_str().len().min(8)]
}
