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

//! Portfolio readout via pass-through exchange credentials.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use fortunamind_core::{AuthContext, ServiceError};

use super::{Permission, Tool, ToolSchema};
use crate::upstream::ExchangeClient;

pub struct GetPortfolioTool {
    upstream: Arc<ExchangeClient>,
}

impl GetPortfolioTool {
    pub fn new(upstream: Arc<ExchangeClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl Tool for GetPortfolioTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_portfolio",
            description: "Account balances from the exchange, using per-request credentials",
            category: "portfolio",
            permissions: &[Permission::Read],
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, auth: &AuthContext, _params: Value) -> Result<Value, ServiceError> {
        let creds = auth
            .upstream_credentials
            .as_ref()
            .ok_or(ServiceError::MissingCredentials)?;
        let accounts = self.upstream.accounts(creds).await?;
        Ok(json!({ "accounts": accounts }))
    }
}
