//! Mint HTTP Client
//!
//! Talks to the Cashu mint's NUT-01 (keysets) and NUT-03 (swap) endpoints.
//! Every call has a timeout; a timeout maps to [`MintClientError::Timeout`],
//! which the caller treats as retryable.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cashu::{BlindedMessage, BlindedSignature, Keyset, Proof};

/// One entry of a NUT-02 `GET /v1/keysets` listing: enough to price a swap
/// fee without the full per-amount key material `GET /v1/keys` carries.
#[derive(Debug, Clone, Deserialize)]
pub struct KeysetInfo {
    pub id: String,
    pub unit: String,
    pub active: bool,
    #[serde(default)]
    pub input_fee_ppk: u64,
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MintClientError {
    #[error("mint request timed out")]
    Timeout,
    #[error("mint request failed: {0}")]
    Request(String),
    #[error("mint returned an error body: {0}")]
    MintError(String),
}

impl From<reqwest::Error> for MintClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MintClientError::Timeout
        } else {
            MintClientError::Request(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeysetsResponse {
    keysets: Vec<Keyset>,
}

#[derive(Debug, Deserialize)]
struct KeysetInfoResponse {
    keysets: Vec<KeysetInfo>,
}

#[derive(Debug, Serialize)]
struct SwapRequest<'a> {
    inputs: &'a [Proof],
    outputs: &'a [BlindedMessage],
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    signatures: Vec<BlindedSignature>,
}

#[derive(Clone)]
pub struct MintClient {
    client: Client,
}

impl MintClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with a fixed, valid config");
        Self { client }
    }

    /// `GET /v1/keys` — all currently active keysets.
    pub async fn active_keysets(&self, mint_url: &str) -> Result<Vec<Keyset>, MintClientError> {
        let url = format!("{}/v1/keys", mint_url.trim_end_matches('/'));
        let resp = self.client.get(&url).send().await?;
        self.parse_keysets(resp).await
    }

    /// `GET /v1/keys/{id}` — a specific (possibly inactive) keyset, used
    /// when a proof references a keyset outside the active cache.
    pub async fn keyset_by_id(
        &self,
        mint_url: &str,
        keyset_id: &str,
    ) -> Result<Vec<Keyset>, MintClientError> {
        let url = format!("{}/v1/keys/{}", mint_url.trim_end_matches('/'), keyset_id);
        let resp = self.client.get(&url).send().await?;
        self.parse_keysets(resp).await
    }

    async fn parse_keysets(&self, resp: reqwest::Response) -> Result<Vec<Keyset>, MintClientError> {
        if !resp.status().is_success() {
            return Err(MintClientError::MintError(resp.status().to_string()));
        }
        let body: KeysetsResponse = resp.json().await?;
        Ok(body.keysets)
    }

    /// `GET /v1/keysets` — every keyset the mint has ever issued (active or
    /// not), with its fee rate but none of its per-amount public keys.
    /// Used to price a swap's mint fee against proofs from older keysets.
    pub async fn all_keysets(&self, mint_url: &str) -> Result<Vec<KeysetInfo>, MintClientError> {
        let url = format!("{}/v1/keysets", mint_url.trim_end_matches('/'));
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(MintClientError::MintError(resp.status().to_string()));
        }
        let body: KeysetInfoResponse = resp.json().await?;
        Ok(body.keysets)
    }

    /// `POST /v1/swap` — atomic at the mint: consumes `inputs`, returns one
    /// blind signature per `output`, in order.
    pub async fn post_swap(
        &self,
        mint_url: &str,
        inputs: &[Proof],
        outputs: &[BlindedMessage],
    ) -> Result<Vec<BlindedSignature>, MintClientError> {
        let url = format!("{}/v1/swap", mint_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&SwapRequest { inputs, outputs })
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MintClientError::MintError(body));
        }

        let body: SwapResponse = resp.json().await?;
        Ok(body.signatures)
    }
}

impl Default for MintClient {
    fn default() -> Self {
        Self::new()
    }
}
