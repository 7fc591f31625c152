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

//! End-to-end pipeline tests against the in-memory backend: the full
//! JSON-RPC handler, authentication pipeline, rate limiter and storage.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use fortunamind_core::identity::Identity;
use fortunamind_core::subscription::{
    SubscriptionRecord, SubscriptionStatus, SubscriptionValidator, ValidatorConfig,
};
use fortunamind_core::{RateLimiter, Tier};
use fortunamind_server::adapter::{PersistenceAdapter, RequestCredentials};
use fortunamind_server::mcp::protocol::{JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use fortunamind_server::mcp::McpHandler;
use fortunamind_server::tools::ToolRegistry;
use fortunamind_server::tools::journal::{GetJournalEntriesTool, StoreJournalEntryTool};
use fortunamind_server::tools::preferences::{GetPreferenceTool, SetPreferenceTool};
use fortunamind_storage::{MemoryStorage, StorageBackend};

const KEY_1: &str = "fm_sub_pipeline_alpha";
const KEY_2: &str = "fm_sub_pipeline_beta";

fn subscription(email: &str, key: &str) -> SubscriptionRecord {
    SubscriptionRecord {
        email: email.into(),
        subscription_key: key.into(),
        tier: Tier::Premium,
        status: SubscriptionStatus::Active,
        expires_at: Some(Utc::now() + Duration::days(30)),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

struct TestServer {
    handler: McpHandler,
    storage: Arc<MemoryStorage>,
}

fn server(per_minute_floor: Option<u32>) -> TestServer {
    let storage = Arc::new(MemoryStorage::new());
    let registry = ToolRegistry::new();
    registry
        .register(Arc::new(StoreJournalEntryTool::new(storage.clone())))
        .unwrap();
    registry
        .register(Arc::new(GetJournalEntriesTool::new(storage.clone())))
        .unwrap();
    registry
        .register(Arc::new(SetPreferenceTool::new(storage.clone())))
        .unwrap();
    registry
        .register(Arc::new(GetPreferenceTool::new(storage.clone())))
        .unwrap();
    let adapter = PersistenceAdapter::new(
        Identity::default(),
        SubscriptionValidator::new(storage.clone(), ValidatorConfig::default()),
        Arc::new(RateLimiter::new(per_minute_floor)),
        registry,
        storage.clone(),
    );
    TestServer {
        handler: McpHandler::new(Arc::new(adapter)),
        storage,
    }
}

fn creds(email: &str, key: &str) -> RequestCredentials {
    RequestCredentials {
        email: email.into(),
        subscription_key: key.into(),
        upstream: None,
    }
}

fn rpc(method: &str, id: JsonRpcId, params: serde_json::Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".into(),
        method: method.into(),
        params: Some(params),
        id,
    }
}

async fn call_tool(
    server: &TestServer,
    creds: &RequestCredentials,
    id: i64,
    name: &str,
    arguments: serde_json::Value,
) -> JsonRpcResponse {
    server
        .handler
        .handle(
            rpc(
                "tools/call",
                JsonRpcId::Number(id),
                json!({ "name": name, "arguments": arguments }),
            ),
            Some(creds.clone()),
        )
        .await
}

// Scenario: initialize then tools/list, no auth anywhere.
#[tokio::test]
async fn initialize_and_list_without_auth() {
    let server = server(None);

    let init = server
        .handler
        .handle(
            rpc(
                "initialize",
                JsonRpcId::String("a1".into()),
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "x", "version": "0" }
                }),
            ),
            None,
        )
        .await;
    assert_eq!(init.id, JsonRpcId::String("a1".into()));
    let result = init.result.expect("initialize succeeds");
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["capabilities"]["tools"], json!({}));

    let list = server
        .handler
        .handle(rpc("tools/list", JsonRpcId::Number(2), json!({})), None)
        .await;
    assert!(!list.result.unwrap()["tools"].as_array().unwrap().is_empty());
}

// Scenario: a call with an unknown subscription key creates nothing.
#[tokio::test]
async fn unauthorized_call_leaves_no_rows() {
    let server = server(None);
    let bad = creds("x@y.zz", "fm_sub_DOESNOTEXIST");

    let response = call_tool(
        &server,
        &bad,
        1,
        "store_journal_entry",
        json!({ "entry_text": "never stored" }),
    )
    .await;

    let error = response.error.expect("must fail");
    assert_eq!(error.code, -32002);
    assert!(error.message.contains("invalid"));

    let handle = Identity::default().derive_handle("x@y.zz").unwrap();
    assert_eq!(
        server.storage.user_stats(&handle).await.unwrap().entries_total,
        0
    );
}

// Scenario: five writes pass, the sixth is rate limited, storage holds
// exactly five entries.
#[tokio::test]
async fn rate_limit_rejects_the_sixth_write() {
    let server = server(Some(5));
    server
        .storage
        .insert_subscription(subscription("limited@example.com", KEY_1));
    let creds = creds("limited@example.com", KEY_1);

    for i in 0..5 {
        let response = call_tool(
            &server,
            &creds,
            i,
            "store_journal_entry",
            json!({ "entry_text": format!("entry {i}") }),
        )
        .await;
        assert!(response.error.is_none(), "call {i} should pass");
    }

    let sixth = call_tool(
        &server,
        &creds,
        6,
        "store_journal_entry",
        json!({ "entry_text": "over quota" }),
    )
    .await;
    let error = sixth.error.expect("sixth call is limited");
    assert_eq!(error.code, -32003);
    let retry_after = error.data.unwrap()["retry_after_secs"].as_u64().unwrap();
    assert!(retry_after > 0);

    let handle = Identity::default()
        .derive_handle("limited@example.com")
        .unwrap();
    assert_eq!(
        server.storage.user_stats(&handle).await.unwrap().entries_total,
        5
    );
}

// Scenario: tenant isolation through the full dispatch path.
#[tokio::test]
async fn second_tenant_cannot_see_first_tenants_entries() {
    let server = server(None);
    server
        .storage
        .insert_subscription(subscription("h1@example.com", KEY_1));
    server
        .storage
        .insert_subscription(subscription("h2@example.com", KEY_2));

    let stored = call_tool(
        &server,
        &creds("h1@example.com", KEY_1),
        1,
        "store_journal_entry",
        json!({ "entry_text": "t1" }),
    )
    .await;
    assert!(stored.error.is_none());

    let listed = call_tool(
        &server,
        &creds("h2@example.com", KEY_2),
        2,
        "get_journal_entries",
        json!({}),
    )
    .await;
    let text = listed.result.unwrap()["content"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(!text.contains("t1"));
    assert!(text.contains("\"count\": 0"));
}

// Scenario: gmail normalization makes aliases one tenant.
#[tokio::test]
async fn gmail_aliases_resolve_to_one_tenant() {
    let server = server(None);
    server
        .storage
        .insert_subscription(subscription("ab@gmail.com", KEY_1));

    let stored = call_tool(
        &server,
        &creds("a.b+promo@gmail.com", KEY_1),
        1,
        "store_journal_entry",
        json!({ "entry_text": "hello" }),
    )
    .await;
    assert!(stored.error.is_none(), "{:?}", stored.error);

    let listed = call_tool(
        &server,
        &creds("AB@GMAIL.com", KEY_1),
        2,
        "get_journal_entries",
        json!({}),
    )
    .await;
    let text = listed.result.unwrap()["content"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(text.contains("hello"));
}

// Preference round trip plus idempotent re-put through the whole stack.
#[tokio::test]
async fn preference_round_trip() {
    let server = server(None);
    server
        .storage
        .insert_subscription(subscription("prefs@example.com", KEY_1));
    let creds = creds("prefs@example.com", KEY_1);

    for _ in 0..2 {
        let set = call_tool(
            &server,
            &creds,
            1,
            "set_preference",
            json!({ "key": "base_currency", "value": "USD" }),
        )
        .await;
        assert!(set.error.is_none());
    }

    let get = call_tool(
        &server,
        &creds,
        2,
        "get_preference",
        json!({ "key": "base_currency" }),
    )
    .await;
    let text = get.result.unwrap()["content"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(text.contains("USD"));
}

// Expired subscriptions are rejected with a non-retryable reason.
#[tokio::test]
async fn expired_subscription_is_rejected() {
    let server = server(None);
    let mut record = subscription("late@example.com", KEY_1);
    record.expires_at = Some(Utc::now() - Duration::days(1));
    server.storage.insert_subscription(record);

    let response = call_tool(
        &server,
        &creds("late@example.com", KEY_1),
        1,
        "get_journal_entries",
        json!({}),
    )
    .await;
    let error = response.error.unwrap();
    assert_eq!(error.code, -32002);
    assert!(error.message.contains("expired"));
    assert_eq!(error.data.unwrap()["retryable"], false);
}

// Registry outage surfaces as retryable unauthorized and is not sticky.
#[tokio::test]
async fn registry_outage_is_retryable_and_recovers() {
    let server = server(None);
    server
        .storage
        .insert_subscription(subscription("flaky@example.com", KEY_1));
    let creds = creds("flaky@example.com", KEY_1);

    server.storage.set_fail_mode(true);
    let response = call_tool(&server, &creds, 1, "get_journal_entries", json!({})).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, -32002);
    assert_eq!(error.data.unwrap()["retryable"], true);

    server.storage.set_fail_mode(false);
    let response = call_tool(&server, &creds, 2, "get_journal_entries", json!({})).await;
    assert!(response.error.is_none(), "{:?}", response.error);
}
