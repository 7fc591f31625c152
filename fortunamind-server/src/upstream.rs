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

//! Deadline-aware client for the third-party exchange API.
//!
//! The exchange is an opaque collaborator: public market data needs no
//! credentials, account data takes the caller's pass-through credentials
//! per request. Credentials go into request headers and nowhere else.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use fortunamind_core::{ServiceError, UpstreamCredentials};

const API_KEY_HEADER: &str = "X-Upstream-Api-Key";
const API_SECRET_HEADER: &str = "X-Upstream-Api-Secret";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotPrice {
    pub symbol: String,
    pub price: f64,
    pub time: String,
}

/// One OHLCV bucket.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Candle {
    pub time: i64,
    pub low: f64,
    pub high: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
}

pub struct ExchangeClient {
    http: reqwest::Client,
    base_url: String,
}

impl ExchangeClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|_| ServiceError::Internal)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Public ticker; no credentials involved.
    pub async fn spot_price(&self, symbol: &str) -> Result<SpotPrice, ServiceError> {
        let url = format!("{}/products/{}/ticker", self.base_url, symbol);
        let body: Value = self.get_json(self.http.get(&url)).await?;
        let price = body
            .get("price")
            .and_then(|p| p.as_str())
            .and_then(|p| p.parse::<f64>().ok())
            .ok_or_else(|| ServiceError::Unavailable("upstream ticker".into()))?;
        Ok(SpotPrice {
            symbol: symbol.to_string(),
            price,
            time: body
                .get("time")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// Public candles, oldest first.
    pub async fn candles(
        &self,
        symbol: &str,
        granularity_secs: u32,
    ) -> Result<Vec<Candle>, ServiceError> {
        let url = format!(
            "{}/products/{}/candles?granularity={}",
            self.base_url, symbol, granularity_secs
        );
        // The exchange returns newest-first rows of
        // [time, low, high, open, close, volume].
        let rows: Vec<[f64; 6]> = serde_json::from_value(self.get_json(self.http.get(&url)).await?)
            .map_err(|_| ServiceError::Unavailable("upstream candles".into()))?;
        let mut candles: Vec<Candle> = rows
            .into_iter()
            .map(|r| Candle {
                time: r[0] as i64,
                low: r[1],
                high: r[2],
                open: r[3],
                close: r[4],
                volume: r[5],
            })
            .collect();
        candles.sort_by_key(|c| c.time);
        Ok(candles)
    }

    /// Account balances for the credential holder.
    pub async fn accounts(&self, creds: &UpstreamCredentials) -> Result<Value, ServiceError> {
        let url = format!("{}/accounts", self.base_url);
        let request = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &creds.api_key)
            .header(API_SECRET_HEADER, &creds.api_secret);
        self.get_json(request).await
    }

    async fn get_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ServiceError> {
        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        debug!(%status, "upstream response");
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ServiceError::Unauthorized {
                reason: "upstream rejected the provided credentials".into(),
                retryable: false,
            });
        }
        if !status.is_success() {
            return Err(ServiceError::Unavailable(format!(
                "upstream returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|_| ServiceError::Unavailable("upstream returned non-JSON".into()))
    }
}

fn classify_transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout(10)
    } else {
        ServiceError::Unavailable("upstream unreachable".into())
    }
}

/// Simple moving average over the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    for value in &values[period..] {
        ema = alpha * value + (1.0 - alpha) * ema;
    }
    Some(ema)
}

/// Wilder RSI over closing prices.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() <= period {
        return None;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in values.windows(2).take(period) {
        let delta = pair[1] - pair[0];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    for pair in values.windows(2).skip(period) {
        let delta = pair[1] - pair[0];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_over_trailing_window() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 5), Some(3.0));
        assert_eq!(sma(&values, 2), Some(4.5));
        assert_eq!(sma(&values, 6), None);
        assert_eq!(sma(&values, 0), None);
    }

    #[test]
    fn ema_converges_toward_recent_values() {
        let values = [10.0; 20];
        let flat = ema(&values, 10).unwrap();
        assert!((flat - 10.0).abs() < 1e-9);

        let mut rising: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let ema_rising = ema(&rising, 10).unwrap();
        let sma_rising = sma(&rising, 10).unwrap();
        // EMA weights the recent, higher values more heavily.
        assert!(ema_rising > sma_rising);

        rising.reverse();
        assert!(ema(&rising, 10).unwrap() < sma(&rising, 10).unwrap());
    }

    #[test]
    fn rsi_extremes() {
        let rising: Vec<f64> = (1..=30).map(|v| v as f64).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        let falling: Vec<f64> = (1..=30).rev().map(|v| v as f64).collect();
        let value = rsi(&falling, 14).unwrap();
        assert!(value < 1.0);

        assert_eq!(rsi(&[1.0, 2.0], 14), None);
    }

    #[test]
    fn rsi_balanced_series_is_near_midpoint() {
        let mut values = Vec::new();
        for i in 0..40 {
            values.push(if i % 2 == 0 { 100.0 } else { 101.0 });
        }
        let value = rsi(&values, 14).unwrap();
        assert!((30.0..=70.0).contains(&value), "rsi = {value}");
    }
}
