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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tiers::Tier;

/// Every subscription key starts with this prefix.
pub const KEY_PREFIX: &str = "fm_sub_";

/// Minimum length of the token following the prefix.
pub const MIN_TOKEN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Revoked,
    Grace,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Revoked => "revoked",
            SubscriptionStatus::Grace => "grace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "expired" => Some(SubscriptionStatus::Expired),
            "revoked" => Some(SubscriptionStatus::Revoked),
            "grace" => Some(SubscriptionStatus::Grace),
            _ => None,
        }
    }
}

/// One row of the subscription registry. `email` is always stored in
/// normalized form; there is at most one row per normalized email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub email: String,
    pub subscription_key: String,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a validation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    MalformedKey,
    InvalidEmail,
    NotFound,
    KeyMismatch,
    Expired,
    Revoked,
    BackendUnavailable,
}

impl InvalidReason {
    /// Only registry outages are worth retrying; everything else is a
    /// caller error until the subscription itself changes.
    pub fn retryable(self) -> bool {
        matches!(self, InvalidReason::BackendUnavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvalidReason::MalformedKey => "malformed_key",
            InvalidReason::InvalidEmail => "invalid_email",
            InvalidReason::NotFound => "not_found",
            InvalidReason::KeyMismatch => "key_mismatch",
            InvalidReason::Expired => "expired",
            InvalidReason::Revoked => "revoked",
            InvalidReason::BackendUnavailable => "backend_unavailable",
        }
    }
}

/// Outcome of a subscription check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub tier: Option<Tier>,
    pub reason: Option<InvalidReason>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Present when the subscription is in its grace period: still valid,
    /// but renewal is due by this instant.
    pub grace_until: Option<DateTime<Utc>>,
    pub cached_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn valid(tier: Tier, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            valid: true,
            tier: Some(tier),
            reason: None,
            expires_at,
            grace_until: None,
            cached_at: Utc::now(),
        }
    }

    pub fn grace(tier: Tier, grace_until: Option<DateTime<Utc>>) -> Self {
        Self {
            valid: true,
            tier: Some(tier),
            reason: None,
            expires_at: grace_until,
            grace_until,
            cached_at: Utc::now(),
        }
    }

    pub fn invalid(reason: InvalidReason) -> Self {
        Self {
            valid: false,
            tier: None,
            reason: Some(reason),
            expires_at: None,
            grace_until: None,
            cached_at: Utc::now(),
        }
    }
}

/// Syntactic check for `fm_sub_<token>` with a >=8 character URL-safe token.
pub fn is_valid_key_format(key: &str) -> bool {
    let Some(token) = key.strip_prefix(KEY_PREFIX) else {
        return false;
    };
    token.len() >= MIN_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert!(is_valid_key_format("fm_sub_abcdefgh"));
        assert!(is_valid_key_format("fm_sub_A1b2-C3d4_e5"));
        assert!(!is_valid_key_format("fm_sub_short"));
        assert!(!is_valid_key_format("sub_abcdefgh"));
        assert!(!is_valid_key_format("fm_sub_has space"));
        assert!(!is_valid_key_format("fm_sub_bad!chars"));
        assert!(!is_valid_key_format(""));
    }

    #[test]
    fn reason_retryability() {
        assert!(InvalidReason::BackendUnavailable.retryable());
        assert!(!InvalidReason::Revoked.retryable());
        assert!(!InvalidReason::MalformedKey.retryable());
    }
}
