//! Authenticated Polymarket CLOB client.
//!
//! Implements the L2 header scheme: each request carries an HMAC-SHA256
//! signature over `timestamp + method + path + body`, plus the API key and
//! passphrase.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, warn};

use super::response::decimal_from_value;
use crate::core::domain::{ConditionId, OrderId, TokenId};
use crate::core::exchange::{NewOrder, OrderAck, Venue, VenueOrder, VenuePosition};
use crate::error::{Error, ExecutionError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Credentials for the CLOB L2 auth scheme, loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClobCredentials {
    #[serde(alias = "apiKey", alias = "key")]
    pub api_key: String,
    #[serde(alias = "secret")]
    pub api_secret: String,
    #[serde(alias = "passphrase")]
    pub api_passphrase: String,
    /// Funder wallet address; doubles as the position-query wallet.
    #[serde(default)]
    pub funder: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

impl ClobCredentials {
    /// Load credentials from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read credentials file {}: {e}", path.display()))
        })?;
        let creds: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid credentials file: {e}")))?;
        if creds.api_key.is_empty() || creds.api_secret.is_empty() {
            return Err(Error::Config("credentials file is missing api_key/api_secret".into()));
        }
        Ok(creds)
    }
}

/// Authenticated order/account client.
pub struct ClobClient {
    http: Client,
    clob_url: String,
    data_url: String,
    creds: ClobCredentials,
}

impl ClobClient {
    pub fn new(
        clob_url: impl Into<String>,
        data_url: impl Into<String>,
        creds: ClobCredentials,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            clob_url: clob_url.into(),
            data_url: data_url.into(),
            creds,
        })
    }

    /// HMAC-SHA256 signature over `timestamp + method + path + body`,
    /// URL-safe base64 encoded.
    fn sign_request(&self, method: &str, path: &str, body: &str, timestamp: i64) -> Result<String> {
        let message = format!("{timestamp}{method}{path}{body}");

        // Secrets appear base64 encoded in several variants in the wild.
        let secret_bytes = URL_SAFE
            .decode(&self.creds.api_secret)
            .or_else(|_| URL_SAFE_NO_PAD.decode(&self.creds.api_secret))
            .or_else(|_| BASE64.decode(&self.creds.api_secret))
            .map_err(|e| Error::Config(format!("cannot decode CLOB secret: {e}")))?;

        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| Error::Config(format!("HMAC key error: {e}")))?;
        mac.update(message.as_bytes());
        Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    /// The five L2 auth headers. Timestamp is epoch seconds.
    fn auth_headers(&self, method: &str, path: &str, body: &str) -> Result<Vec<(&'static str, String)>> {
        let timestamp = Utc::now().timestamp();
        let signature = self.sign_request(method, path, body, timestamp)?;
        Ok(vec![
            ("POLY_ADDRESS", self.creds.funder.clone().unwrap_or_default()),
            ("POLY_API_KEY", self.creds.api_key.clone()),
            ("POLY_SIGNATURE", signature),
            ("POLY_TIMESTAMP", timestamp.to_string()),
            ("POLY_PASSPHRASE", self.creds.api_passphrase.clone()),
        ])
    }

    async fn post_signed(&self, path: &str, body: Value) -> Result<Value> {
        let body_text = serde_json::to_string(&body)?;
        let headers = self.auth_headers("POST", path, &body_text)?;
        let mut request = self
            .http
            .post(format!("{}{path}", self.clob_url))
            .header("Content-Type", "application/json")
            .body(body_text);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let reason = payload
                .get("error")
                .or_else(|| payload.get("errorMsg"))
                .and_then(Value::as_str)
                .unwrap_or("unknown venue error")
                .to_string();
            return Err(ExecutionError::VenueRejected { reason }.into());
        }
        Ok(payload)
    }

    async fn get_signed(&self, base: &str, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let headers = self.auth_headers("GET", path, "")?;
        let mut request = self.http.get(format!("{base}{path}")).query(query);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Venue for ClobClient {
    async fn submit_order(&self, order: &NewOrder) -> Result<OrderAck> {
        let body = serde_json::json!({
            "order": {
                "tokenID": order.token_id.as_str(),
                "price": order.price.to_string(),
                "size": order.size.to_string(),
                "side": order.side.as_str(),
            },
            "orderType": "GTC",
        });
        debug!(token = %order.token_id, side = %order.side, price = %order.price, "Submitting order");
        let payload = self.post_signed("/order", body).await?;

        let order_id = payload
            .get("orderID")
            .or_else(|| payload.get("orderId"))
            .or_else(|| payload.get("order_id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(OrderAck { order_id, status })
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<bool> {
        let body = serde_json::json!({ "orderID": order_id.as_str() });
        match self.post_signed("/order/cancel", body).await {
            Ok(_) => Ok(true),
            Err(Error::Execution(ExecutionError::VenueRejected { reason }))
                if reason.to_ascii_lowercase().contains("cancel") =>
            {
                // "Already canceled" counts as success: cancel is idempotent.
                warn!(order_id = %order_id, reason = %reason, "Cancel reported already done");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn order_status(&self, order_id: &OrderId) -> Result<VenueOrder> {
        let path = format!("/data/order/{}", order_id.as_str());
        let payload = self.get_signed(&self.clob_url, &path, &[]).await?;

        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();
        let size_matched = payload
            .get("size_matched")
            .or_else(|| payload.get("sizeMatched"))
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO);
        let avg_fill_price = payload
            .get("price")
            .or_else(|| payload.get("avgPrice"))
            .and_then(decimal_from_value);
        Ok(VenueOrder {
            status,
            size_matched,
            avg_fill_price,
        })
    }

    async fn balance(&self) -> Result<Decimal> {
        let payload = self
            .get_signed(
                &self.clob_url,
                "/balance-allowance",
                &[("asset_type", "COLLATERAL".to_string())],
            )
            .await?;
        // Balance comes back as micro-USDC.
        let micro = payload
            .get("balance")
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO);
        Ok(micro / Decimal::from(1_000_000))
    }

    async fn positions(&self) -> Result<Vec<VenuePosition>> {
        let wallet = self.creds.funder.clone().unwrap_or_default();
        if wallet.is_empty() {
            return Ok(Vec::new());
        }
        let payload = self
            .get_signed(&self.data_url, "/positions", &[("user", wallet)])
            .await?;
        let Some(rows) = payload.as_array() else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter_map(|row| {
                let token_id = row
                    .get("asset")
                    .or_else(|| row.get("tokenId"))
                    .and_then(Value::as_str)?;
                let size = row.get("size").and_then(decimal_from_value)?;
                let avg_price = row
                    .get("avgPrice")
                    .or_else(|| row.get("avg_price"))
                    .and_then(decimal_from_value)
                    .unwrap_or(Decimal::ZERO);
                Some(VenuePosition {
                    token_id: TokenId::from(token_id),
                    condition_id: row
                        .get("conditionId")
                        .or_else(|| row.get("condition_id"))
                        .and_then(Value::as_str)
                        .map(ConditionId::from),
                    size,
                    avg_price,
                    current_price: row
                        .get("curPrice")
                        .or_else(|| row.get("currentPrice"))
                        .and_then(decimal_from_value),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> ClobCredentials {
        ClobCredentials {
            // base64 of "test-secret-bytes"
            api_key: "key".into(),
            api_secret: BASE64.encode(b"test-secret-bytes"),
            api_passphrase: "pass".into(),
            funder: Some("0xwallet".into()),
            private_key: None,
        }
    }

    fn client() -> ClobClient {
        ClobClient::new(
            "https://clob.example",
            "https://data.example",
            creds(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn signature_is_deterministic_for_same_inputs() {
        let c = client();
        let a = c.sign_request("POST", "/order", "{}", 1_700_000_000).unwrap();
        let b = c.sign_request("POST", "/order", "{}", 1_700_000_000).unwrap();
        assert_eq!(a, b);
        let other = c.sign_request("POST", "/order", "{}", 1_700_000_001).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn auth_headers_carry_all_five_fields() {
        let headers = client().auth_headers("GET", "/balance-allowance", "").unwrap();
        let names: Vec<&str> = headers.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "POLY_ADDRESS",
                "POLY_API_KEY",
                "POLY_SIGNATURE",
                "POLY_TIMESTAMP",
                "POLY_PASSPHRASE"
            ]
        );
    }
}
