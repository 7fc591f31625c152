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

//! Embedded schema migrations.
//!
//! Applied in version order at startup inside one transaction each, with a
//! `schema_migrations` ledger making the whole procedure idempotent. The
//! server refuses to start until they report success.

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS user_subscriptions (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                email VARCHAR(255) NOT NULL,
                subscription_key VARCHAR(255),
                tier VARCHAR(50) NOT NULL DEFAULT 'free',
                status VARCHAR(50) NOT NULL DEFAULT 'active',
                expires_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT uq_user_subscriptions_email UNIQUE (email)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_user_subscriptions_email ON user_subscriptions (email)",
            r#"
            CREATE TABLE IF NOT EXISTS journal_entries (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_handle VARCHAR(64) NOT NULL,
                entry_text TEXT NOT NULL,
                entry_type VARCHAR(50) NOT NULL DEFAULT 'reflection',
                tags TEXT[] NOT NULL DEFAULT '{}',
                metadata JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_journal_entries_user_handle ON journal_entries (user_handle)",
            "CREATE INDEX IF NOT EXISTS idx_journal_entries_user_created ON journal_entries (user_handle, created_at DESC)",
            r#"
            CREATE TABLE IF NOT EXISTS user_preferences (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_handle VARCHAR(64) NOT NULL,
                preference_key VARCHAR(255) NOT NULL,
                preference_value JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT uq_user_preferences_user_key UNIQUE (user_handle, preference_key)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_user_preferences_user_handle ON user_preferences (user_handle)",
            r#"
            CREATE TABLE IF NOT EXISTS storage_records (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_handle VARCHAR(64) NOT NULL,
                record_type VARCHAR(50) NOT NULL,
                record_key VARCHAR(255) NOT NULL,
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_storage_records_user_handle ON storage_records (user_handle)",
            "CREATE INDEX IF NOT EXISTS idx_storage_records_user_type ON storage_records (user_handle, record_type)",
        ],
    },
    Migration {
        version: 2,
        name: "row_level_security",
        statements: &[
            "ALTER TABLE journal_entries ENABLE ROW LEVEL SECURITY",
            "ALTER TABLE user_preferences ENABLE ROW LEVEL SECURITY",
            "ALTER TABLE storage_records ENABLE ROW LEVEL SECURITY",
            // user_subscriptions is system-managed and carries no policy.
            r#"
            CREATE POLICY journal_entries_tenant ON journal_entries
                USING (user_handle = current_setting('app.user_handle', true))
            "#,
            r#"
            CREATE POLICY user_preferences_tenant ON user_preferences
                USING (user_handle = current_setting('app.user_handle', true))
            "#,
            r#"
            CREATE POLICY storage_records_tenant ON storage_records
                USING (user_handle = current_setting('app.user_handle', true))
            "#,
        ],
    },
];
