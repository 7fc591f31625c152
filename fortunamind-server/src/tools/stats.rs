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

//! Per-user storage and quota statistics.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use fortunamind_core::{AuthContext, RateLimiter, ServiceError};
use fortunamind_storage::StorageBackend;

use super::{Permission, Tool, ToolSchema};

pub struct GetUserStatsTool {
    storage: Arc<dyn StorageBackend>,
    limiter: Arc<RateLimiter>,
}

impl GetUserStatsTool {
    pub fn new(storage: Arc<dyn StorageBackend>, limiter: Arc<RateLimiter>) -> Self {
        Self { storage, limiter }
    }
}

#[async_trait]
impl Tool for GetUserStatsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_user_stats",
            description: "Storage usage and rate-limit consumption for the authenticated user",
            category: "account",
            permissions: &[Permission::Read],
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, auth: &AuthContext, _params: Value) -> Result<Value, ServiceError> {
        let stats = self.storage.user_stats(&auth.user_handle).await?;
        let usage = self.limiter.usage(&auth.user_handle);
        let limits = auth.tier.limits();
        Ok(json!({
            "tier": auth.tier,
            "storage": stats,
            "rate": {
                "usage": usage,
                "limits": {
                    "per_hour": limits.per_hour,
                    "per_day": limits.per_day,
                    "per_month": limits.per_month,
                }
            }
        }))
    }
}
