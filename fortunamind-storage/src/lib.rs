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

//! User-scoped persistence: journal entries, preferences and generic
//! records, isolated per tenant at two layers. Every query carries an
//! explicit `user_handle` predicate, and the PostgreSQL backend sets a
//! transaction-local session variable that the tables' row-level-security
//! policies enforce independently.

pub mod backend;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;

pub use backend::{StorageBackend, StorageError};
pub use memory::MemoryStorage;
pub use models::{
    EntryFilter, HealthStatus, JournalEntry, StorageRecord, UserPreference, UserStats,
};
pub use postgres::PostgresStorage;
