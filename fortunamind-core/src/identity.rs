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

//! Email-based identity derivation.
//!
//! Maps a user's email address to a stable, opaque 64-hex-character handle
//! that survives exchange credential rotation. Handles are the sole tenant
//! key in storage; the raw email never leaves this module except in its
//! normalized form inside the per-request auth context.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Default namespace mixed into every digest. Bumping this constant (with a
/// data migration) rotates every handle in a deployment.
pub const DEFAULT_NAMESPACE: &str = "fm-identity-v1";

/// Domains whose local parts are dot-insensitive and support `+` tags.
const ALIAS_NORMALIZING_DOMAINS: &[&str] = &["gmail.com", "googlemail.com"];

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid email address")]
    InvalidEmail,
}

/// Opaque per-user tenant key: lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserHandle(String);

impl UserHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept an externally supplied handle, verifying its shape.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }
}

impl std::fmt::Display for UserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle derivation, parameterized by deployment namespace.
#[derive(Debug, Clone)]
pub struct Identity {
    namespace: String,
}

impl Identity {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Derive the stable user handle for an email address.
    ///
    /// Total, pure and deterministic: equal emails under [`normalize_email`]
    /// always produce the identical handle.
    pub fn derive_handle(&self, email: &str) -> Result<UserHandle, IdentityError> {
        let normalized = normalize_email(email)?;
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update(b":");
        hasher.update(normalized.as_bytes());
        Ok(UserHandle(hex::encode(hasher.finalize())))
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Normalize an email address for identity and subscription lookups.
///
/// Trims whitespace and lowercases the whole address. For domains with
/// known aliasing (gmail-style), dots are stripped from the local part and
/// any `+` suffix is removed.
pub fn normalize_email(email: &str) -> Result<String, IdentityError> {
    let trimmed = email.trim().to_ascii_lowercase();
    let (local, domain) = trimmed.split_once('@').ok_or(IdentityError::InvalidEmail)?;
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(IdentityError::InvalidEmail);
    }
    if trimmed.chars().any(char::is_whitespace) || domain.contains('@') {
        return Err(IdentityError::InvalidEmail);
    }

    if ALIAS_NORMALIZING_DOMAINS.contains(&domain) {
        let local = local.split('+').next().unwrap_or(local).replace('.', "");
        if local.is_empty() {
            return Err(IdentityError::InvalidEmail);
        }
        Ok(format!("{}@{}", local, domain))
    } else {
        Ok(trimmed)
    }
}
