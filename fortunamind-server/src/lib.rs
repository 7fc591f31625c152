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

//! FortunaMind Persistent MCP server.
//!
//! A subscription-gated, multi-tenant MCP server: JSON-RPC 2.0 over HTTP
//! and stdio, per-user journal and preference storage with row-level
//! isolation, tier-based rate limiting, and pass-through exchange
//! credentials that never persist.

pub mod adapter;
pub mod api;
pub mod config;
pub mod mcp;
pub mod tools;
pub mod upstream;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fortunamind_core::identity::Identity;
use fortunamind_core::subscription::{
    SubscriptionRegistry, SubscriptionValidator, ValidatorConfig,
};
use fortunamind_core::RateLimiter;
use fortunamind_storage::{MemoryStorage, PostgresStorage, StorageBackend};

use adapter::PersistenceAdapter;
use api::AppState;
use config::{SecurityProfile, ServerMode, Settings, StorageKind};
use mcp::McpHandler;
use tools::ToolRegistry;
use upstream::ExchangeClient;

/// Initialize the tracing subscriber. Stdio mode must keep stdout clean
/// for JSON-RPC, so everything goes to stderr.
pub fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.env_filter()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Build every component and wire them into one handler. Migrations run
/// here; the server does not come up until they succeed.
pub async fn build_handler(settings: &Settings) -> Result<Arc<McpHandler>> {
    let (storage, registry_backend): (
        Arc<dyn StorageBackend>,
        Arc<dyn SubscriptionRegistry>,
    ) = match settings.storage_backend {
        StorageKind::Postgres => {
            let url = settings
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let postgres = Arc::new(
                PostgresStorage::connect(url)
                    .await
                    .context("failed to connect to postgres")?,
            );
            (postgres.clone(), postgres)
        }
        StorageKind::Memory => {
            info!("using in-memory storage backend (development/test aid)");
            let memory = Arc::new(MemoryStorage::new());
            (memory.clone(), memory)
        }
    };

    let applied = storage
        .migrate()
        .await
        .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    if applied.is_empty() {
        info!("schema up to date");
    } else {
        info!(versions = ?applied, "migrations applied");
    }

    let validator = SubscriptionValidator::new(
        registry_backend,
        ValidatorConfig {
            positive_ttl: std::time::Duration::from_secs(settings.subscription_cache_ttl_seconds),
            ..ValidatorConfig::default()
        },
    );
    let limiter = Arc::new(RateLimiter::new(settings.rate_limit_per_minute));
    let upstream = Arc::new(ExchangeClient::new(
        settings.upstream.base_url.clone(),
        settings.upstream.timeout_secs,
    )?);

    let registry = ToolRegistry::new();
    register_default_tools(&registry, storage.clone(), upstream, limiter.clone())?;
    info!(tools = registry.len(), "tool registry populated");

    let adapter = PersistenceAdapter::new(
        Identity::new(settings.identity_namespace.clone()),
        validator,
        limiter,
        registry,
        storage,
    );
    Ok(Arc::new(McpHandler::new(Arc::new(adapter))))
}

/// The fixed tool set. Extension is a code change here, not a runtime
/// plugin scan.
pub fn register_default_tools(
    registry: &ToolRegistry,
    storage: Arc<dyn StorageBackend>,
    upstream: Arc<ExchangeClient>,
    limiter: Arc<RateLimiter>,
) -> Result<()> {
    use tools::journal::{
        DeleteJournalEntryTool, GetJournalEntriesTool, GetJournalEntryTool, StoreJournalEntryTool,
        UpdateJournalEntryTool,
    };
    use tools::market::{CalculateIndicatorsTool, GetPriceTool};
    use tools::portfolio::GetPortfolioTool;
    use tools::preferences::{GetPreferenceTool, SetPreferenceTool};
    use tools::stats::GetUserStatsTool;

    registry.register(Arc::new(StoreJournalEntryTool::new(storage.clone())))?;
    registry.register(Arc::new(GetJournalEntriesTool::new(storage.clone())))?;
    registry.register(Arc::new(GetJournalEntryTool::new(storage.clone())))?;
    registry.register(Arc::new(UpdateJournalEntryTool::new(storage.clone())))?;
    registry.register(Arc::new(DeleteJournalEntryTool::new(storage.clone())))?;
    registry.register(Arc::new(SetPreferenceTool::new(storage.clone())))?;
    registry.register(Arc::new(GetPreferenceTool::new(storage.clone())))?;
    registry.register(Arc::new(GetUserStatsTool::new(storage, limiter)))?;
    registry.register(Arc::new(GetPortfolioTool::new(upstream.clone())))?;
    registry.register(Arc::new(GetPriceTool::new(upstream.clone())))?;
    registry.register(Arc::new(CalculateIndicatorsTool::new(upstream)))?;
    Ok(())
}

/// Run the configured transport until shutdown.
pub async fn run_server(settings: Settings) -> Result<()> {
    settings.validate()?;
    let handler = build_handler(&settings).await?;

    match settings.server_mode {
        ServerMode::Http => run_http(settings, handler).await,
        ServerMode::Stdio => {
            let creds = mcp::stdio::credentials_from_env();
            mcp::run_stdio(handler, creds)
                .await
                .context("stdio transport failed")
        }
    }
}

async fn run_http(settings: Settings, handler: Arc<McpHandler>) -> Result<()> {
    let state = AppState::new(handler, settings.request_timeout_secs);

    let cors = match settings.security_profile {
        SecurityProfile::Moderate => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        SecurityProfile::Strict => {
            let origins: Vec<HeaderValue> = settings
                .cors_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([
                    header::CONTENT_TYPE,
                    HeaderName::from_static("x-user-email"),
                    HeaderName::from_static("x-subscription-key"),
                    HeaderName::from_static("x-upstream-api-key"),
                    HeaderName::from_static("x-upstream-api-secret"),
                ])
        }
    };

    let app = Router::new()
        .merge(mcp::mcp_router(state.clone()))
        .merge(api::health::health_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = settings.socket_addr()?;
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("http server failed")
}
