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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use fortunamind_core::identity::DEFAULT_NAMESPACE;

/// Which transport the process speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Http,
    Stdio,
}

/// CORS and input-scanning stringency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProfile {
    Strict,
    Moderate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_mode")]
    pub server_mode: ServerMode,

    #[serde(default = "default_host")]
    pub server_host: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    /// Relational store connection string. Required for the postgres
    /// backend.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageKind,

    #[serde(default = "default_security_profile")]
    pub security_profile: SecurityProfile,

    /// Allowed origins under the strict profile. Ignored when moderate.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_namespace")]
    pub identity_namespace: String,

    #[serde(default = "default_cache_ttl")]
    pub subscription_cache_ttl_seconds: u64,

    /// Global floor on a per-minute sub-window, layered under the tier
    /// windows.
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,

    /// Reserved for a future signed-token mode; validated for length only.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamSettings {
    /// Base URL of the exchange API.
    #[serde(default = "default_upstream_url")]
    pub base_url: String,

    /// Deadline for any single upstream call.
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

fn default_mode() -> ServerMode {
    ServerMode::Http
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_storage_backend() -> StorageKind {
    StorageKind::Postgres
}

fn default_security_profile() -> SecurityProfile {
    SecurityProfile::Moderate
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

fn default_upstream_url() -> String {
    "https://api.exchange.coinbase.com".to_string()
}

fn default_upstream_timeout() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_mode: default_mode(),
            server_host: default_host(),
            server_port: default_port(),
            database_url: None,
            storage_backend: default_storage_backend(),
            security_profile: default_security_profile(),
            cors_origins: vec![],
            log_level: default_log_level(),
            identity_namespace: default_namespace(),
            subscription_cache_ttl_seconds: default_cache_ttl(),
            rate_limit_per_minute: None,
            jwt_secret: None,
            request_timeout_secs: default_request_timeout(),
            upstream: UpstreamSettings::default(),
        }
    }
}

impl Settings {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Apply recognized environment variables on top of `self`.
    ///
    /// Recognized variables: `SERVER_MODE`, `SERVER_HOST`, `SERVER_PORT`,
    /// `DATABASE_URL`, `STORAGE_BACKEND`, `SECURITY_PROFILE`, `LOG_LEVEL`,
    /// `IDENTITY_NAMESPACE`, `SUBSCRIPTION_CACHE_TTL_SECONDS`,
    /// `RATE_LIMIT_PER_MINUTE`, `JWT_SECRET`, `CORS_ORIGINS`,
    /// `UPSTREAM_API_URL`.
    pub fn apply_env(&mut self) {
        if let Ok(mode) = std::env::var("SERVER_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "http" => self.server_mode = ServerMode::Http,
                "stdio" => self.server_mode = ServerMode::Stdio,
                _ => {}
            }
        }
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.server_host = host;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            if let Ok(port) = port.parse() {
                self.server_port = port;
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Ok(kind) = std::env::var("STORAGE_BACKEND") {
            match kind.to_ascii_lowercase().as_str() {
                "postgres" => self.storage_backend = StorageKind::Postgres,
                "memory" => self.storage_backend = StorageKind::Memory,
                _ => {}
            }
        }
        if let Ok(profile) = std::env::var("SECURITY_PROFILE") {
            match profile.to_ascii_lowercase().as_str() {
                "strict" => self.security_profile = SecurityProfile::Strict,
                "moderate" => self.security_profile = SecurityProfile::Moderate,
                _ => {}
            }
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(namespace) = std::env::var("IDENTITY_NAMESPACE") {
            self.identity_namespace = namespace;
        }
        if let Ok(ttl) = std::env::var("SUBSCRIPTION_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse() {
                self.subscription_cache_ttl_seconds = ttl;
            }
        }
        if let Ok(floor) = std::env::var("RATE_LIMIT_PER_MINUTE") {
            if let Ok(floor) = floor.parse() {
                self.rate_limit_per_minute = Some(floor);
            }
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(url) = std::env::var("UPSTREAM_API_URL") {
            self.upstream.base_url = url;
        }
    }

    /// Priority: file < environment. CLI overrides land afterwards in main.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut settings = match config_file {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::warn!(?path, "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.server_host, self.server_port).parse()?)
    }

    /// Reject fatal misconfiguration before any component starts.
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.storage_backend == StorageKind::Postgres && self.database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required for the postgres backend");
        }
        if let Some(secret) = &self.jwt_secret {
            if secret.len() < 32 {
                anyhow::bail!("JWT_SECRET must be at least 32 characters");
            }
        }
        if self.security_profile == SecurityProfile::Strict && self.cors_origins.is_empty() {
            anyhow::bail!("strict security profile requires an explicit CORS origin allowlist");
        }
        if !matches!(
            self.log_level.as_str(),
            "debug" | "info" | "warning" | "warn" | "error"
        ) {
            anyhow::bail!("unrecognized LOG_LEVEL: {}", self.log_level);
        }
        Ok(())
    }

    /// Filter directive for the tracing subscriber.
    pub fn env_filter(&self) -> String {
        let level = match self.log_level.as_str() {
            "warning" => "warn",
            other => other,
        };
        format!("fortunamind_server={level},fortunamind_core={level},fortunamind_storage={level},tower_http=info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_for_memory_backend() {
        let settings = Settings {
            storage_backend: StorageKind::Memory,
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn postgres_without_url_is_fatal() {
        let settings = Settings::default();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn short_jwt_secret_is_fatal() {
        let settings = Settings {
            storage_backend: StorageKind::Memory,
            jwt_secret: Some("too-short".into()),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn strict_profile_needs_origins() {
        let mut settings = Settings {
            storage_backend: StorageKind::Memory,
            security_profile: SecurityProfile::Strict,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
        settings.cors_origins = vec!["https://app.fortunamind.com".into()];
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn toml_round_trip() {
        let toml = r#"
            server_mode = "stdio"
            server_host = "0.0.0.0"
            server_port = 9000
            storage_backend = "memory"
            log_level = "debug"
        "#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.server_mode, ServerMode::Stdio);
        assert_eq!(settings.server_port, 9000);
        assert_eq!(settings.subscription_cache_ttl_seconds, 300);
    }
}
