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

//! Cached subscription validation.
//!
//! The validator is the only component that consults the subscription
//! registry. Results are cached in a bounded map: positive results for the
//! configured TTL, negative results for a shorter TTL to absorb key
//! probing, and registry outages not at all so the next request re-attempts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use moka::sync::Cache;
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{
    is_valid_key_format, InvalidReason, SubscriptionRecord, SubscriptionStatus, ValidationResult,
};
use crate::identity::normalize_email;

/// Lookup interface to wherever `SubscriptionRecord`s live. Implemented by
/// the storage layer; mocked in tests.
#[async_trait::async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Fetch the subscription row for a normalized email, if any.
    async fn find_subscription(
        &self,
        email_normalized: &str,
    ) -> Result<Option<SubscriptionRecord>, RegistryError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("subscription registry unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// TTL for positive results. Subscription changes become visible with
    /// at most this delay.
    pub positive_ttl: Duration,
    /// TTL for negative results.
    pub negative_ttl: Duration,
    /// Maximum cached (email, key) pairs.
    pub max_entries: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            positive_ttl: Duration::from_secs(300),
            negative_ttl: Duration::from_secs(30),
            max_entries: 10_000,
        }
    }
}

#[derive(Clone)]
struct CachedEntry {
    result: ValidationResult,
    inserted_at: Instant,
    ttl: Duration,
}

pub struct SubscriptionValidator {
    registry: Arc<dyn SubscriptionRegistry>,
    cache: Cache<String, CachedEntry>,
    config: ValidatorConfig,
}

impl SubscriptionValidator {
    pub fn new(registry: Arc<dyn SubscriptionRegistry>, config: ValidatorConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            // Upper bound; per-entry freshness is checked against the
            // entry's own TTL on read.
            .time_to_live(config.positive_ttl)
            .build();
        Self {
            registry,
            cache,
            config,
        }
    }

    /// Validate an (email, subscription key) pair.
    ///
    /// Never fails with an exception for caller errors: malformed keys,
    /// unknown emails, revoked or expired subscriptions all come back as
    /// structured invalid results.
    pub async fn validate(&self, email: &str, key: &str) -> ValidationResult {
        if !is_valid_key_format(key) {
            return ValidationResult::invalid(InvalidReason::MalformedKey);
        }

        let email = match normalize_email(email) {
            Ok(normalized) => normalized,
            Err(_) => return ValidationResult::invalid(InvalidReason::InvalidEmail),
        };

        let cache_key = format!("{}:{}", email, key);
        if let Some(entry) = self.cache.get(&cache_key) {
            if entry.inserted_at.elapsed() < entry.ttl {
                debug!(email_hash = %email_prefix(&email), "subscription cache hit");
                return entry.result;
            }
        }

        let result = match self.registry.find_subscription(&email).await {
            Ok(record) => Self::judge(record, key),
            Err(RegistryError::Unavailable(cause)) => {
                warn!(%cause, "subscription registry unavailable");
                // Not cached: the next request should re-attempt.
                return ValidationResult::invalid(InvalidReason::BackendUnavailable);
            }
        };

        let ttl = if result.valid {
            self.config.positive_ttl
        } else {
            self.config.negative_ttl
        };
        self.cache.insert(
            cache_key,
            CachedEntry {
                result: result.clone(),
                inserted_at: Instant::now(),
                ttl,
            },
        );

        debug!(
            email_hash = %email_prefix(&email),
            valid = result.valid,
            tier = result.tier.map(|t| t.as_str()).unwrap_or("-"),
            "subscription validated"
        );
        result
    }

    fn judge(record: Option<SubscriptionRecord>, key: &str) -> ValidationResult {
        let Some(record) = record else {
            return ValidationResult::invalid(InvalidReason::NotFound);
        };
        if record.subscription_key != key {
            return ValidationResult::invalid(InvalidReason::KeyMismatch);
        }
        match record.status {
            SubscriptionStatus::Revoked => ValidationResult::invalid(InvalidReason::Revoked),
            SubscriptionStatus::Expired => ValidationResult::invalid(InvalidReason::Expired),
            SubscriptionStatus::Grace => ValidationResult::grace(record.tier, record.expires_at),
            SubscriptionStatus::Active => match record.expires_at {
                Some(expiry) if expiry <= Utc::now() => {
                    ValidationResult::invalid(InvalidReason::Expired)
                }
                other => ValidationResult::valid(record.tier, other),
            },
        }
    }

    /// Number of live cache entries, for diagnostics.
    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }
}

// Log identifier for an email without logging the email.
fn email_prefix(email: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(email.as_bytes());
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::Tier;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRegistry {
        record: parking_lot::Mutex<Option<SubscriptionRecord>>,
        lookups: AtomicUsize,
        unavailable: std::sync::atomic::AtomicBool,
    }

    impl FakeRegistry {
        fn with(record: Option<SubscriptionRecord>) -> Arc<Self> {
            Arc::new(Self {
                record: parking_lot::Mutex::new(record),
                lookups: AtomicUsize::new(0),
                unavailable: std::sync::atomic::AtomicBool::new(false),
            })
        }
    }

    #[async_trait::async_trait]
    impl SubscriptionRegistry for FakeRegistry {
        async fn find_subscription(
            &self,
            _email: &str,
        ) -> Result<Option<SubscriptionRecord>, RegistryError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(RegistryError::Unavailable("connection refused".into()));
            }
            Ok(self.record.lock().clone())
        }
    }

    fn record(key: &str, status: SubscriptionStatus) -> SubscriptionRecord {
        SubscriptionRecord {
            email: "trader@example.com".into(),
            subscription_key: key.into(),
            tier: Tier::Premium,
            status,
            expires_at: Some(Utc::now() + ChronoDuration::days(30)),
            created_at: Utc::now() - ChronoDuration::days(5),
            updated_at: Utc::now(),
        }
    }

    fn validator(registry: Arc<FakeRegistry>) -> SubscriptionValidator {
        SubscriptionValidator::new(registry, ValidatorConfig::default())
    }

    const KEY: &str = "fm_sub_abcdefgh123";

    #[tokio::test]
    async fn active_subscription_validates() {
        let registry = FakeRegistry::with(Some(record(KEY, SubscriptionStatus::Active)));
        let v = validator(registry);
        let result = v.validate("trader@example.com", KEY).await;
        assert!(result.valid);
        assert_eq!(result.tier, Some(Tier::Premium));
        assert!(result.expires_at.is_some());
    }

    #[tokio::test]
    async fn malformed_key_never_touches_registry() {
        let registry = FakeRegistry::with(Some(record(KEY, SubscriptionStatus::Active)));
        let v = validator(registry.clone());
        let result = v.validate("trader@example.com", "not_a_key").await;
        assert!(!result.valid);
        assert_eq!(result.reason, Some(InvalidReason::MalformedKey));
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_calls_hit_registry_once() {
        let registry = FakeRegistry::with(Some(record(KEY, SubscriptionStatus::Active)));
        let v = validator(registry.clone());
        for _ in 0..5 {
            assert!(v.validate("trader@example.com", KEY).await.valid);
        }
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn email_aliases_share_a_cache_entry() {
        let registry = FakeRegistry::with(Some(SubscriptionRecord {
            email: "ab@gmail.com".into(),
            ..record(KEY, SubscriptionStatus::Active)
        }));
        let v = validator(registry.clone());
        assert!(v.validate("a.b+x@gmail.com", KEY).await.valid);
        assert!(v.validate("AB@Gmail.com", KEY).await.valid);
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_key_and_revoked_and_expired() {
        let registry = FakeRegistry::with(Some(record(KEY, SubscriptionStatus::Active)));
        let v = validator(registry.clone());
        let result = v.validate("trader@example.com", "fm_sub_DOESNOTEXIST").await;
        assert_eq!(result.reason, Some(InvalidReason::KeyMismatch));

        *registry.record.lock() = Some(record(KEY, SubscriptionStatus::Revoked));
        let v = validator(registry.clone());
        let result = v.validate("trader@example.com", KEY).await;
        assert_eq!(result.reason, Some(InvalidReason::Revoked));

        let mut expired = record(KEY, SubscriptionStatus::Active);
        expired.expires_at = Some(Utc::now() - ChronoDuration::hours(1));
        *registry.record.lock() = Some(expired);
        let v = validator(registry);
        let result = v.validate("trader@example.com", KEY).await;
        assert_eq!(result.reason, Some(InvalidReason::Expired));
    }

    #[tokio::test]
    async fn grace_is_valid_with_hint() {
        let registry = FakeRegistry::with(Some(record(KEY, SubscriptionStatus::Grace)));
        let v = validator(registry);
        let result = v.validate("trader@example.com", KEY).await;
        assert!(result.valid);
        assert!(result.grace_until.is_some());
    }

    #[tokio::test]
    async fn outage_is_not_cached() {
        let registry = FakeRegistry::with(Some(record(KEY, SubscriptionStatus::Active)));
        registry.unavailable.store(true, Ordering::SeqCst);
        let v = validator(registry.clone());

        let result = v.validate("trader@example.com", KEY).await;
        assert_eq!(result.reason, Some(InvalidReason::BackendUnavailable));

        // Registry recovers; the very next call must re-attempt and succeed.
        registry.unavailable.store(false, Ordering::SeqCst);
        let result = v.validate("trader@example.com", KEY).await;
        assert!(result.valid);
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 2);
    }
}
