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

//! The authenticated call path.
//!
//! Every tool invocation, regardless of transport, runs the same pipeline:
//! validate subscription → derive handle → rate limit → dispatch. Each
//! step short-circuits with a structured error; a request that fails the
//! rate limit never reaches storage or the upstream exchange.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use fortunamind_core::identity::Identity;
use fortunamind_core::subscription::{InvalidReason, SubscriptionValidator, ValidationResult};
use fortunamind_core::{AuthContext, RateLimiter, ServiceError, Tier, UpstreamCredentials};
use fortunamind_storage::StorageBackend;

use crate::tools::{ToolRegistry, ToolResult};

/// Credentials as extracted from the transport, before validation.
#[derive(Debug, Clone)]
pub struct RequestCredentials {
    pub email: String,
    pub subscription_key: String,
    pub upstream: Option<UpstreamCredentials>,
}

/// Owns every component of the call path. Constructed once at startup;
/// there is no global state and no lazy initialization.
pub struct PersistenceAdapter {
    identity: Identity,
    validator: SubscriptionValidator,
    limiter: Arc<RateLimiter>,
    registry: ToolRegistry,
    storage: Arc<dyn StorageBackend>,
}

impl PersistenceAdapter {
    pub fn new(
        identity: Identity,
        validator: SubscriptionValidator,
        limiter: Arc<RateLimiter>,
        registry: ToolRegistry,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            identity,
            validator,
            limiter,
            registry,
            storage,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn validator(&self) -> &SubscriptionValidator {
        &self.validator
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run the shared authentication pipeline and produce a per-request
    /// context. Does not touch the rate limiter; that happens per tool
    /// call so the write/read failure policy can apply.
    async fn authenticate(
        &self,
        creds: &RequestCredentials,
        request_id: Option<Value>,
    ) -> Result<AuthContext, ServiceError> {
        let result = self
            .validator
            .validate(&creds.email, &creds.subscription_key)
            .await;
        let tier = Self::require_valid(&result)?;
        let handle = self
            .identity
            .derive_handle(&creds.email)
            .map_err(|_| ServiceError::InvalidEmail)?;
        let email_normalized = fortunamind_core::identity::normalize_email(&creds.email)
            .map_err(|_| ServiceError::InvalidEmail)?;

        Ok(AuthContext {
            user_handle: handle,
            email_normalized,
            tier,
            subscription_key: creds.subscription_key.clone(),
            upstream_credentials: creds.upstream.clone(),
            request_id,
            received_at: Utc::now(),
        })
    }

    fn require_valid(result: &ValidationResult) -> Result<Tier, ServiceError> {
        if result.valid {
            return result.tier.ok_or(ServiceError::Internal);
        }
        Err(match result.reason {
            Some(InvalidReason::MalformedKey) => ServiceError::MalformedSubscriptionKey,
            Some(InvalidReason::InvalidEmail) => ServiceError::InvalidEmail,
            Some(reason) => ServiceError::Unauthorized {
                reason: format!("invalid subscription: {}", reason.as_str()),
                retryable: reason.retryable(),
            },
            None => ServiceError::Internal,
        })
    }

    /// The six-stage pipeline for one tool call.
    pub async fn call_tool(
        &self,
        creds: &RequestCredentials,
        name: &str,
        arguments: Value,
        request_id: Option<Value>,
    ) -> Result<ToolResult, ServiceError> {
        let auth = self.authenticate(creds, request_id).await?;

        // Resolve before charging quota so the write/read failure policy
        // below knows what kind of tool this is. An unknown name is free.
        let schema = self
            .registry
            .schema_of(name)
            .ok_or_else(|| ServiceError::UnknownTool(name.to_string()))?;

        let mut degraded = false;
        match self.limiter.check_and_record(&auth.user_handle, auth.tier) {
            Ok(decision) if !decision.allowed => {
                return Err(ServiceError::RateLimited {
                    retry_after_secs: decision.retry_after_secs.unwrap_or(1),
                });
            }
            Ok(_) => {}
            Err(unavailable) => {
                // Fail closed for writes, open with a warning for reads:
                // an abusive burst of reads is survivable, an unmetered
                // write path is not.
                if schema.requires_write() {
                    return Err(ServiceError::Unavailable("rate limiter".into()));
                }
                warn!(error = %unavailable, tool = name, "rate limiter degraded, allowing read");
                degraded = true;
            }
        }

        let mut result = self.registry.dispatch(name, &auth, arguments).await?;
        if degraded {
            if let Value::Object(map) = &mut result.metadata {
                map.insert("rate_limit_degraded".into(), Value::Bool(true));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use fortunamind_core::subscription::{
        SubscriptionRecord, SubscriptionStatus, ValidatorConfig,
    };
    use fortunamind_storage::MemoryStorage;
    use serde_json::json;

    const KEY: &str = "fm_sub_adapter_test_key";

    fn subscription(email: &str, tier: Tier) -> SubscriptionRecord {
        SubscriptionRecord {
            email: email.into(),
            subscription_key: KEY.into(),
            tier,
            status: SubscriptionStatus::Active,
            expires_at: Some(Utc::now() + ChronoDuration::days(30)),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn adapter_with(
        storage: Arc<MemoryStorage>,
        per_minute_floor: Option<u32>,
    ) -> PersistenceAdapter {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(crate::tools::journal::StoreJournalEntryTool::new(
                storage.clone(),
            )))
            .unwrap();
        registry
            .register(Arc::new(crate::tools::journal::GetJournalEntriesTool::new(
                storage.clone(),
            )))
            .unwrap();
        PersistenceAdapter::new(
            Identity::default(),
            SubscriptionValidator::new(storage.clone(), ValidatorConfig::default()),
            Arc::new(RateLimiter::new(per_minute_floor)),
            registry,
            storage,
        )
    }

    fn creds(email: &str) -> RequestCredentials {
        RequestCredentials {
            email: email.into(),
            subscription_key: KEY.into(),
            upstream: None,
        }
    }

    #[tokio::test]
    async fn unknown_subscription_is_unauthorized_and_writes_nothing() {
        let storage = Arc::new(MemoryStorage::new());
        let adapter = adapter_with(storage.clone(), None);

        let err = adapter
            .call_tool(
                &creds("stranger@example.com"),
                "store_journal_entry",
                json!({ "entry_text": "hi" }),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized { .. }));
        assert!(err.to_string().contains("invalid"));

        let handle = Identity::default()
            .derive_handle("stranger@example.com")
            .unwrap();
        assert_eq!(
            storage
                .user_stats(&handle)
                .await
                .unwrap()
                .entries_total,
            0
        );
    }

    #[tokio::test]
    async fn rate_limited_call_creates_no_entry() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert_subscription(subscription("limited@example.com", Tier::Premium));
        let adapter = adapter_with(storage.clone(), Some(5));
        let creds = creds("limited@example.com");

        for i in 0..5 {
            let result = adapter
                .call_tool(
                    &creds,
                    "store_journal_entry",
                    json!({ "entry_text": format!("entry {i}") }),
                    None,
                )
                .await
                .unwrap();
            assert!(result.success);
        }

        let err = adapter
            .call_tool(
                &creds,
                "store_journal_entry",
                json!({ "entry_text": "sixth" }),
                None,
            )
            .await
            .unwrap_err();
        match err {
            ServiceError::RateLimited { retry_after_secs } => assert!(retry_after_secs > 0),
            other => panic!("unexpected: {other:?}"),
        }

        let handle = Identity::default()
            .derive_handle("limited@example.com")
            .unwrap();
        assert_eq!(storage.user_stats(&handle).await.unwrap().entries_total, 5);
    }

    #[tokio::test]
    async fn gmail_aliases_see_the_same_journal() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert_subscription(subscription("ab@gmail.com", Tier::Premium));
        let adapter = adapter_with(storage, None);

        adapter
            .call_tool(
                &creds("a.b+promo@gmail.com"),
                "store_journal_entry",
                json!({ "entry_text": "hello" }),
                None,
            )
            .await
            .unwrap();

        let listed = adapter
            .call_tool(&creds("AB@GMAIL.com"), "get_journal_entries", json!({}), None)
            .await
            .unwrap();
        assert_eq!(listed.data.unwrap()["count"], 1);
    }

    #[tokio::test]
    async fn tenants_are_isolated_through_the_full_pipeline() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert_subscription(subscription("h1@example.com", Tier::Premium));
        storage.insert_subscription(SubscriptionRecord {
            email: "h2@example.com".into(),
            subscription_key: "fm_sub_other_tenant_key".into(),
            ..subscription("h2@example.com", Tier::Premium)
        });
        let adapter = adapter_with(storage, None);

        adapter
            .call_tool(
                &creds("h1@example.com"),
                "store_journal_entry",
                json!({ "entry_text": "t1" }),
                None,
            )
            .await
            .unwrap();

        let other = RequestCredentials {
            email: "h2@example.com".into(),
            subscription_key: "fm_sub_other_tenant_key".into(),
            upstream: None,
        };
        let listed = adapter
            .call_tool(&other, "get_journal_entries", json!({}), None)
            .await
            .unwrap();
        let data = listed.data.unwrap();
        assert_eq!(data["count"], 0);
        assert!(!data.to_string().contains("t1"));
    }

    #[tokio::test]
    async fn unknown_tool_after_auth() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert_subscription(subscription("tools@example.com", Tier::Premium));
        let adapter = adapter_with(storage, None);

        let err = adapter
            .call_tool(&creds("tools@example.com"), "no_such_tool", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn malformed_key_short_circuits() {
        let storage = Arc::new(MemoryStorage::new());
        let adapter = adapter_with(storage, None);
        let bad = RequestCredentials {
            email: "x@y.zz".into(),
            subscription_key: "bogus".into(),
            upstream: None,
        };
        let err = adapter
            .call_tool(&bad, "get_journal_entries", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MalformedSubscriptionKey));
    }
}
