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

//! Market data tools: spot prices and technical indicators computed over
//! upstream candles.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use fortunamind_core::{AuthContext, ServiceError};

use super::{Permission, Tool, ToolSchema};
use crate::upstream::{ema, rsi, sma, ExchangeClient};

pub struct GetPriceTool {
    upstream: Arc<ExchangeClient>,
}

impl GetPriceTool {
    pub fn new(upstream: Arc<ExchangeClient>) -> Self {
        Self { upstream }
    }
}

#[derive(Deserialize)]
struct PriceParams {
    symbol: String,
}

#[async_trait]
impl Tool for GetPriceTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_price",
            description: "Current spot price for a trading pair, e.g. BTC-USD",
            category: "market",
            permissions: &[Permission::Read],
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {
                        "type": "string",
                        "pattern": "^[A-Z0-9]+-[A-Z0-9]+$",
                        "description": "Product id in BASE-QUOTE form"
                    }
                },
                "required": ["symbol"]
            }),
        }
    }

    async fn execute(&self, _auth: &AuthContext, params: Value) -> Result<Value, ServiceError> {
        let params: PriceParams = serde_json::from_value(params)
            .map_err(|e| ServiceError::InvalidParameters(e.to_string()))?;
        let price = self.upstream.spot_price(&params.symbol).await?;
        Ok(serde_json::to_value(price).map_err(|_| ServiceError::Internal)?)
    }
}

pub struct CalculateIndicatorsTool {
    upstream: Arc<ExchangeClient>,
}

impl CalculateIndicatorsTool {
    pub fn new(upstream: Arc<ExchangeClient>) -> Self {
        Self { upstream }
    }
}

#[derive(Deserialize)]
struct IndicatorParams {
    symbol: String,
    #[serde(default = "default_granularity")]
    granularity_secs: u32,
    #[serde(default = "default_period")]
    period: usize,
    #[serde(default = "default_indicators")]
    indicators: Vec<String>,
}

fn default_granularity() -> u32 {
    3_600
}

fn default_period() -> usize {
    14
}

fn default_indicators() -> Vec<String> {
    vec!["sma".into(), "ema".into(), "rsi".into()]
}

#[async_trait]
impl Tool for CalculateIndicatorsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "calculate_indicators",
            description: "Compute SMA, EMA and RSI over recent candles for a trading pair",
            category: "market",
            permissions: &[Permission::Read],
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": {
                        "type": "string",
                        "pattern": "^[A-Z0-9]+-[A-Z0-9]+$"
                    },
                    "granularity_secs": {
                        "type": "integer",
                        "enum": [60, 300, 900, 3600, 21600, 86400]
                    },
                    "period": { "type": "integer", "minimum": 2, "maximum": 200 },
                    "indicators": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["sma", "ema", "rsi"] },
                        "minItems": 1
                    }
                },
                "required": ["symbol"]
            }),
        }
    }

    async fn execute(&self, _auth: &AuthContext, params: Value) -> Result<Value, ServiceError> {
        let params: IndicatorParams = serde_json::from_value(params)
            .map_err(|e| ServiceError::InvalidParameters(e.to_string()))?;

        let candles = self
            .upstream
            .candles(&params.symbol, params.granularity_secs)
            .await?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        if closes.len() <= params.period {
            return Err(ServiceError::InvalidParameters(format!(
                "not enough candles for period {} (got {})",
                params.period,
                closes.len()
            )));
        }

        let mut results = Map::new();
        for indicator in &params.indicators {
            let value = match indicator.as_str() {
                "sma" => sma(&closes, params.period),
                "ema" => ema(&closes, params.period),
                "rsi" => rsi(&closes, params.period),
                other => {
                    return Err(ServiceError::InvalidParameters(format!(
                        "unknown indicator: {other}"
                    )))
                }
            };
            results.insert(indicator.clone(), json!(value));
        }

        Ok(json!({
            "symbol": params.symbol,
            "granularity_secs": params.granularity_secs,
            "period": params.period,
            "candles": closes.len(),
            "indicators": results,
        }))
    }
}
