//! Off-chain API client - points, APY, terms of use
//!
//! Every call has a hard timeout and never errors out to the caller:
//! anything that goes wrong comes back as `None` (or `false` for writes).
//!
//! Endpoints (relative to `API_BASE_URL`):
//!   GET  /points/{chain_id}/{address}   -> { "points": 123 }
//!   GET  /apy/{chain_id}/{vault}        -> { "30d_apy": 4.2, "7d_apy": 3.9 }
//!   GET  /terms/{chain_id}/{address}    -> { "signed": true }
//!   POST /terms/{chain_id}/{address}    <- { "signature": "0x..." }

use alloy_primitives::{hex, Address};
use alloy_signer::Signer;
use eyre::Result;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

// ============================================
// CONSTANTS
// ============================================

/// APY moves slowly; avoid hitting the API on every refresh
const APY_CACHE_SECS: u64 = 300;

/// Message the user signs to accept the terms of use
pub const TERMS_TEXT: &str = "By signing this message I confirm that I have read and agree to the Terms of Use of the LTV Protocol.";

// ============================================
// API RESPONSE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct PointsResponse {
    points: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VaultApy {
    #[serde(rename = "30d_apy")]
    pub apy_30d: Option<f64>,
    #[serde(rename = "7d_apy")]
    pub apy_7d: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TermsResponse {
    signed: bool,
}

#[derive(Debug, Serialize)]
struct TermsSubmission<'a> {
    signature: &'a str,
}

// ============================================
// RESPONSE INTERPRETATION
// ============================================

/// 404 means the address never earned points
pub fn interpret_points(status: StatusCode, body: &str) -> Option<u64> {
    if status == StatusCode::NOT_FOUND {
        return Some(0);
    }
    if !status.is_success() {
        return None;
    }
    serde_json::from_str::<PointsResponse>(body).ok().map(|r| r.points)
}

pub fn interpret_apy(status: StatusCode, body: &str) -> Option<VaultApy> {
    if !status.is_success() {
        return None;
    }
    serde_json::from_str(body).ok()
}

pub fn interpret_terms(status: StatusCode, body: &str) -> Option<bool> {
    if !status.is_success() {
        return None;
    }
    serde_json::from_str::<TermsResponse>(body).ok().map(|r| r.signed)
}

/// Sign the terms text; returns the 0x-prefixed 65-byte signature
pub async fn sign_terms<S: Signer + Sync>(signer: &S) -> Result<String> {
    let signature = signer.sign_message(TERMS_TEXT.as_bytes()).await?;
    Ok(hex::encode_prefixed(signature.as_bytes()))
}

// ============================================
// CLIENT
// ============================================

#[derive(Debug, Clone)]
struct CachedApy {
    apy: VaultApy,
    fetched_at: Instant,
}

pub struct ApiClient {
    http_client: Client,
    base_url: String,
    chain_id: u64,
    apy_cache: Arc<RwLock<HashMap<Address, CachedApy>>>,
}

impl ApiClient {
    pub fn new(base_url: &str, chain_id: u64, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id,
            apy_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn url(&self, resource: &str, address: Address) -> String {
        format!("{}/{}/{}/{}", self.base_url, resource, self.chain_id, address)
    }

    /// Status and body, or `None` when the request itself failed
    async fn get(&self, url: &str) -> Option<(StatusCode, String)> {
        let response = match self.http_client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("API request failed ({}): {}", url, e);
                return None;
            }
        };
        let status = response.status();
        match response.text().await {
            Ok(body) => {
                trace!("GET {} -> {}", url, status);
                Some((status, body))
            }
            Err(e) => {
                warn!("API response unreadable ({}): {}", url, e);
                None
            }
        }
    }

    pub async fn points(&self, address: Address) -> Option<u64> {
        let (status, body) = self.get(&self.url("points", address)).await?;
        let points = interpret_points(status, &body);
        if points.is_none() {
            debug!("Points unavailable for {} (HTTP {})", address, status);
        }
        points
    }

    /// Vault APY, cached for a few minutes
    pub async fn apy(&self, vault: Address) -> Option<VaultApy> {
        {
            let cache = self.apy_cache.read().await;
            if let Some(cached) = cache.get(&vault) {
                if cached.fetched_at.elapsed() < Duration::from_secs(APY_CACHE_SECS) {
                    trace!("Using cached APY for {}", vault);
                    return Some(cached.apy);
                }
            }
        }

        let (status, body) = self.get(&self.url("apy", vault)).await?;
        let apy = interpret_apy(status, &body)?;

        {
            let mut cache = self.apy_cache.write().await;
            cache.insert(vault, CachedApy { apy, fetched_at: Instant::now() });
        }
        Some(apy)
    }

    pub async fn terms_signed(&self, address: Address) -> Option<bool> {
        let (status, body) = self.get(&self.url("terms", address)).await?;
        interpret_terms(status, &body)
    }

    /// Store a terms signature; `true` once the API accepted it
    pub async fn submit_terms_signature(&self, address: Address, signature: &str) -> bool {
        let url = self.url("terms", address);
        match self
            .http_client
            .post(&url)
            .json(&TermsSubmission { signature })
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Terms signature rejected: HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Terms signature upload failed: {}", e);
                false
            }
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Signature;
    use alloy_signer_local::PrivateKeySigner;

    #[test]
    fn test_points_interpretation() {
        assert_eq!(interpret_points(StatusCode::OK, r#"{"points": 1250}"#), Some(1250));
        assert_eq!(interpret_points(StatusCode::NOT_FOUND, "not found"), Some(0));
        assert_eq!(interpret_points(StatusCode::OK, r#"{"score": 3}"#), None);
        assert_eq!(interpret_points(StatusCode::OK, "<html>"), None);
        assert_eq!(interpret_points(StatusCode::INTERNAL_SERVER_ERROR, r#"{"points": 1}"#), None);
    }

    #[test]
    fn test_apy_fields_are_optional() {
        let apy = interpret_apy(StatusCode::OK, r#"{"30d_apy": 4.5}"#).unwrap();
        assert_eq!(apy.apy_30d, Some(4.5));
        assert_eq!(apy.apy_7d, None);

        let both = interpret_apy(StatusCode::OK, r#"{"30d_apy": 4.5, "7d_apy": 3.25}"#).unwrap();
        assert_eq!(both.apy_7d, Some(3.25));

        assert_eq!(interpret_apy(StatusCode::BAD_GATEWAY, "{}"), None);
    }

    #[test]
    fn test_terms_interpretation() {
        assert_eq!(interpret_terms(StatusCode::OK, r#"{"signed": true}"#), Some(true));
        assert_eq!(interpret_terms(StatusCode::OK, r#"{"signed": false}"#), Some(false));
        assert_eq!(interpret_terms(StatusCode::OK, "null"), None);
        assert_eq!(interpret_terms(StatusCode::NOT_FOUND, ""), None);
    }

    #[tokio::test]
    async fn test_terms_signature_recovers_signer() {
        let signer = PrivateKeySigner::random();
        let signature = sign_terms(&signer).await.unwrap();

        let bytes = hex::decode(&signature).unwrap();
        assert_eq!(bytes.len(), 65);
        let parsed = Signature::from_raw(&bytes).unwrap();
        let recovered = parsed.recover_address_from_msg(TERMS_TEXT).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[tokio::test]
    async fn test_unreachable_api_yields_none() {
        let client = ApiClient::new("http://127.0.0.1:9/", 1, Duration::from_millis(500)).unwrap();
        assert_eq!(client.url("points", Address::ZERO), format!("http://127.0.0.1:9/points/1/{}", Address::ZERO));
        assert_eq!(client.points(Address::ZERO).await, None);
        assert!(!client.submit_terms_signature(Address::ZERO, "0x00").await);
    }
}
