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

//! Public error taxonomy.
//!
//! Every failure that can cross the protocol boundary is one of these
//! variants. Validation and authorization failures are recovered at the
//! boundary and returned as structured responses; storage and upstream
//! failures are classified here before they surface. Messages never carry
//! credentials or internal source chains.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("malformed subscription key")]
    MalformedSubscriptionKey,

    #[error("missing credentials")]
    MissingCredentials,

    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String, retryable: bool },

    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("operation timed out after {0}s")]
    Timeout(u64),

    #[error("internal error")]
    Internal,
}

impl ServiceError {
    /// JSON-RPC error code. Standard codes where one exists, application
    /// codes above -32000 otherwise.
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            ServiceError::InvalidEmail => -32602,
            ServiceError::InvalidParameters(_) => -32602,
            ServiceError::MissingCredentials => -32001,
            ServiceError::MalformedSubscriptionKey => -32002,
            ServiceError::Unauthorized { .. } => -32002,
            ServiceError::RateLimited { .. } => -32003,
            ServiceError::UnknownTool(_) => -32601,
            ServiceError::NotFound(_) => -32004,
            ServiceError::Conflict(_) => -32005,
            ServiceError::Unavailable(_) => -32006,
            ServiceError::Timeout(_) => -32007,
            ServiceError::Internal => -32603,
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            ServiceError::Unauthorized { retryable, .. } => *retryable,
            ServiceError::RateLimited { .. }
            | ServiceError::Unavailable(_)
            | ServiceError::Timeout(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_retryability() {
        assert_eq!(
            ServiceError::UnknownTool("x".into()).json_rpc_code(),
            -32601
        );
        assert_eq!(ServiceError::MissingCredentials.json_rpc_code(), -32001);
        assert_eq!(
            ServiceError::RateLimited {
                retry_after_secs: 3
            }
            .json_rpc_code(),
            -32003
        );
        assert!(ServiceError::Unavailable("db".into()).retryable());
        assert!(!ServiceError::Conflict("dup".into()).retryable());
        assert!(ServiceError::Unauthorized {
            reason: "subscription registry unavailable".into(),
            retryable: true
        }
        .retryable());
        assert!(!ServiceError::Unauthorized {
            reason: "revoked".into(),
            retryable: false
        }
        .retryable());
    }

    #[test]
    fn internal_error_has_no_detail() {
        assert_eq!(ServiceError::Internal.to_string(), "internal error");
    }
}
