//! Wallets held by the identity provider.
//!
//! The provider signs and broadcasts on the user's behalf; we only hand it
//! the unsigned transaction over HTTPS.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use ww_core::constants::{CHAIN_ID, HTTP_TIMEOUT_SECS};
use ww_core::error::ChainError;
use ww_core::traits::Signer;
use ww_core::{Address, TransactionRequest, TxHash};

use crate::hexutil;

#[derive(Debug, Deserialize)]
struct SendResponse {
    hash: String,
}

pub struct EmbeddedSigner {
    http: Client,
    api_url: String,
    api_key: String,
    address: Address,
}

impl EmbeddedSigner {
    pub fn new(api_url: &str, api_key: &str, address: Address) -> Result<Self, ChainError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ChainError::Signer(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            address,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/wallets/{}/transactions", self.api_url, self.address)
    }

    fn body(&self, request: &TransactionRequest) -> Value {
        json!({
            "chainId": CHAIN_ID,
            "transaction": hexutil::transaction_json(request),
        })
    }
}

#[async_trait]
impl Signer for EmbeddedSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> &'static str {
        "embedded"
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError> {
        let request = request.with_from(self.address);
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.body(&request))
            .send()
            .await
            .map_err(|e| ChainError::Signer(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            debug!(%status, body = %text, "embedded wallet rejected transaction");
            return Err(ChainError::Signer(format!("wallet api returned {status}")));
        }

        let sent: SendResponse = resp
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("wallet api response: {e}")))?;
        TxHash::parse(&sent.hash).map_err(|e| ChainError::Decode(e.to_string()))
    }
}
