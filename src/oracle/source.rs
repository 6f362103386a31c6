//! `Source` capability: every oracle input — blockchain RPC reader, signed
//! HTTPS feed, or internal simulator — is treated as opaque behind this
//! trait (spec.md §6, `OracleSource`).

use crate::error::OracleError;
use crate::oracle::types::OracleSample;
use async_trait::async_trait;
use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;

#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier reported on every sample this source produces.
    fn source_id(&self) -> &str;

    /// Poll the source for fresh samples. Implementations should be quick
    /// and non-blocking of the wrapper's hot path — only the oracle's
    /// background refresh loop calls this.
    async fn poll(&self, symbol: &str) -> Result<Vec<OracleSample>, OracleError>;
}

/// Deterministic, PRNG-seeded source for tests and demos. Grounded on the
/// teacher's simulated/backtest feed adapters (`backtest_v2::sim_adapter`).
pub struct SimulatedSource {
    id: String,
    base_price: f64,
    drift_bps: f64,
    rng: Mutex<ChaCha8Rng>,
}

impl SimulatedSource {
    pub fn new(id: impl Into<String>, base_price: f64, drift_bps: f64, seed: u64) -> Self {
        Self {
            id: id.into(),
            base_price,
            drift_bps,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl Source for SimulatedSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn poll(&self, symbol: &str) -> Result<Vec<OracleSample>, OracleError> {
        let mut rng = self.rng.lock().expect("simulated source rng poisoned");
        let jitter = rng.gen_range(-self.drift_bps..=self.drift_bps) / 10_000.0;
        let price = self.base_price * (1.0 + jitter);
        Ok(vec![OracleSample {
            source_id: self.id.clone(),
            symbol: symbol.to_string(),
            price,
            reported_at: Utc::now(),
            signature: None,
        }])
    }
}

/// Generic signed-HTTPS price endpoint, grounded on the teacher's
/// `scrapers::dome_rest`/`polymarket_api` REST client idiom: a lean
/// `reqwest::Client`, one GET per poll, JSON body mapped onto the source's
/// own schema by the caller-supplied `parse` closure.
pub struct HttpSource {
    id: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Source for HttpSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn poll(&self, symbol: &str) -> Result<Vec<OracleSample>, OracleError> {
        let url = format!("{}?symbol={}", self.endpoint, symbol);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::SourceFailed(self.id.clone(), e.to_string()))?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OracleError::SourceFailed(self.id.clone(), e.to_string()))?;
        let price = body
            .get("price")
            .and_then(|p| p.as_f64())
            .ok_or_else(|| {
                OracleError::SourceFailed(self.id.clone(), "missing price field".into())
            })?;
        Ok(vec![OracleSample {
            source_id: self.id.clone(),
            symbol: symbol.to_string(),
            price,
            reported_at: Utc::now(),
            signature: body
                .get("signature")
                .and_then(|s| s.as_str())
                .map(String::from),
        }])
    }
}

/// EVM/Solana-style JSON-RPC reader, grounded on the teacher's
/// `scrapers::chainlink_feed` round-reading pattern. The RPC method and
/// result-path are caller-supplied since different chains expose price
/// rounds under different shapes; this struct only owns the transport.
pub struct RpcSource {
    id: String,
    rpc_url: String,
    client: reqwest::Client,
    method: String,
    params: serde_json::Value,
}

impl RpcSource {
    pub fn new(
        id: impl Into<String>,
        rpc_url: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            rpc_url: rpc_url.into(),
            client: reqwest::Client::new(),
            method: method.into(),
            params,
        }
    }
}

#[async_trait]
impl Source for RpcSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn poll(&self, symbol: &str) -> Result<Vec<OracleSample>, OracleError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": self.method,
            "params": self.params,
        });
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::SourceFailed(self.id.clone(), e.to_string()))?;
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OracleError::SourceFailed(self.id.clone(), e.to_string()))?;
        let price = json
            .get("result")
            .and_then(|r| r.get("price"))
            .and_then(|p| p.as_f64())
            .ok_or_else(|| {
                OracleError::SourceFailed(self.id.clone(), "missing result.price".into())
            })?;
        Ok(vec![OracleSample {
            source_id: self.id.clone(),
            symbol: symbol.to_string(),
            price,
            reported_at: Utc::now(),
            signature: None,
        }])
    }
}
