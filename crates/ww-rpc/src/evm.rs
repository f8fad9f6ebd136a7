//! Ethereum JSON-RPC chain access.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use ww_core::constants::{
    CONFIRMATION_POLL_MILLIS, ERC20_BALANCE_OF_SELECTOR, ERC20_DECIMALS_SELECTOR,
    ERC20_SYMBOL_SELECTOR, HTTP_TIMEOUT_SECS, NATIVE_DECIMALS,
};
use ww_core::amount::MAX_DECIMALS;
use ww_core::error::ChainError;
use ww_core::traits::{ChainClient, Signer};
use ww_core::{Address, Amount, Receipt, TokenBalance, TransactionRequest, TxHash};

use crate::hexutil;

fn params<I: Serialize>(items: impl IntoIterator<Item = I>) -> Result<ArrayParams, ChainError> {
    let mut params = ArrayParams::new();
    for item in items {
        params
            .insert(item)
            .map_err(|e| ChainError::Rpc(format!("encode params: {e}")))?;
    }
    Ok(params)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<Option<Receipt>, ChainError> {
        // Some nodes return a receipt with a null block while still pending.
        let Some(block) = self.block_number else {
            return Ok(None);
        };
        let tx_hash = TxHash::parse(&self.transaction_hash)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        let success = match self.status.as_deref() {
            Some(status) => hexutil::parse_quantity(status)? == 1,
            None => true,
        };
        Ok(Some(Receipt {
            tx_hash,
            block_number: hexutil::parse_quantity(&block)? as u64,
            success,
        }))
    }
}

/// [`ChainClient`] over an Ethereum JSON-RPC HTTP endpoint.
#[derive(Clone)]
pub struct EvmRpcClient {
    client: HttpClient,
    poll_interval: Duration,
}

impl EvmRpcClient {
    pub fn new(endpoint: &str) -> Result<Self, ChainError> {
        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build(endpoint)
            .map_err(|e| ChainError::Rpc(format!("client for {endpoint}: {e}")))?;
        Ok(Self {
            client,
            poll_interval: Duration::from_millis(CONFIRMATION_POLL_MILLIS),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: ArrayParams) -> Result<T, ChainError> {
        self.client
            .request(method, params)
            .await
            .map_err(|e| ChainError::Rpc(format!("{method}: {e}")))
    }

    async fn eth_call(&self, to: &Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let call = json!({ "to": to.to_hex(), "data": hexutil::bytes(&data) });
        let result: String = self
            .call("eth_call", params([call, json!("latest")])?)
            .await?;
        hexutil::parse_bytes(&result)
    }

    /// Current chain id, used to check the endpoint at startup.
    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let id: String = self.call("eth_chainId", ArrayParams::new()).await?;
        Ok(hexutil::parse_quantity(&id)? as u64)
    }

    /// Submit through the node's own account management.
    pub async fn send_transaction(&self, request: &TransactionRequest) -> Result<TxHash, ChainError> {
        let hash: String = self
            .call("eth_sendTransaction", params([hexutil::transaction_json(request)])?)
            .await?;
        TxHash::parse(&hash).map_err(|e| ChainError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChainClient for EvmRpcClient {
    async fn native_balance(&self, address: &Address) -> Result<Amount, ChainError> {
        let wei: String = self
            .call("eth_getBalance", params([address.to_hex(), "latest".to_string()])?)
            .await?;
        Ok(Amount::new(hexutil::parse_quantity(&wei)?, NATIVE_DECIMALS))
    }

    async fn token_balance(&self, address: &Address, contract: &Address) -> Result<TokenBalance, ChainError> {
        let mut balance_of = ERC20_BALANCE_OF_SELECTOR.to_vec();
        balance_of.extend_from_slice(&address.abi_word());

        let (raw, decimals, symbol) = tokio::try_join!(
            self.eth_call(contract, balance_of),
            self.eth_call(contract, ERC20_DECIMALS_SELECTOR.to_vec()),
            self.eth_call(contract, ERC20_SYMBOL_SELECTOR.to_vec()),
        )?;

        decode_token_balance(contract, &raw, &decimals, &symbol)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        let price: String = self.call("eth_gasPrice", ArrayParams::new()).await?;
        hexutil::parse_quantity(&price)
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        let receipt: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", params([hash.to_hex()])?)
            .await?;
        match receipt {
            Some(receipt) => receipt.into_receipt(),
            None => Ok(None),
        }
    }

    async fn wait_for_confirmation(&self, hash: &TxHash, timeout: Duration) -> Result<Receipt, ChainError> {
        poll_receipt(hash, self.poll_interval, timeout, || self.transaction_receipt(hash)).await
    }
}

/// Poll until the transaction is mined or `timeout` elapses. Transport
/// errors are retried: the transaction is already submitted, so giving up
/// early would report a transfer that may still land.
async fn poll_receipt<F, Fut>(
    hash: &TxHash,
    interval: Duration,
    timeout: Duration,
    mut fetch: F,
) -> Result<Receipt, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<Receipt>, ChainError>>,
{
    let poll = async {
        loop {
            match fetch().await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => debug!(tx_hash = %hash, "transaction pending"),
                Err(ChainError::Rpc(e)) => warn!(tx_hash = %hash, error = %e, "receipt poll failed, retrying"),
                Err(e) => return Err(e),
            }
            tokio::time::sleep(interval).await;
        }
    };
    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::ConfirmationTimeout {
            tx_hash: hash.to_hex(),
            waited_secs: timeout.as_secs(),
        }),
    }
}

fn decode_token_balance(
    contract: &Address,
    raw: &[u8],
    decimals: &[u8],
    symbol: &[u8],
) -> Result<TokenBalance, ChainError> {
    let decimals = u8::try_from(hexutil::abi_uint(decimals)?)
        .ok()
        .filter(|d| *d <= MAX_DECIMALS)
        .ok_or_else(|| ChainError::Decode(format!("decimals of {contract} out of range")))?;
    Ok(TokenBalance {
        balance: Amount::new(hexutil::abi_uint(raw)?, decimals),
        symbol: hexutil::abi_string(symbol)?,
    })
}

/// An account unlocked on the RPC node itself.
pub struct NodeSigner {
    rpc: EvmRpcClient,
    address: Address,
}

impl NodeSigner {
    pub fn new(rpc: EvmRpcClient, address: Address) -> Self {
        Self { rpc, address }
    }
}

#[async_trait]
impl Signer for NodeSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> &'static str {
        "node"
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError> {
        let request = request.with_from(self.address);
        self.rpc.send_transaction(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(block: Option<&str>, status: Option<&str>) -> RpcReceipt {
        RpcReceipt {
            transaction_hash: format!("0x{}", "ab".repeat(32)),
            block_number: block.map(str::to_string),
            status: status.map(str::to_string),
        }
    }

    #[test]
    fn mined_receipt() {
        let r = receipt(Some("0x10"), Some("0x1")).into_receipt().unwrap().unwrap();
        assert_eq!(r.block_number, 16);
        assert!(r.success);
    }

    #[test]
    fn reverted_receipt() {
        let r = receipt(Some("0x10"), Some("0x0")).into_receipt().unwrap().unwrap();
        assert!(!r.success);
    }

    #[test]
    fn pending_receipt_is_none() {
        assert!(receipt(None, None).into_receipt().unwrap().is_none());
    }

    fn word(value: u128) -> Vec<u8> {
        let mut word = vec![0u8; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        word
    }

    #[test]
    fn token_decimals_beyond_max_scale_rejected() {
        let contract = Address::from_bytes([0xcc; 20]);
        let mut symbol = [0u8; 32];
        symbol[..4].copy_from_slice(b"USDC");

        let ok = decode_token_balance(&contract, &word(1_500_000), &word(6), &symbol).unwrap();
        assert_eq!(ok.balance, Amount::new(1_500_000, 6));
        assert_eq!(ok.symbol, "USDC");

        for decimals in [39, 50, 255, 256] {
            let err = decode_token_balance(&contract, &word(1), &word(decimals), &symbol).unwrap_err();
            assert!(matches!(err, ChainError::Decode(_)), "decimals {decimals}: {err:?}");
        }
    }

    fn mined(hash: TxHash) -> Receipt {
        Receipt { tx_hash: hash, block_number: 7, success: true }
    }

    #[tokio::test(start_paused = true)]
    async fn poll_retries_transient_rpc_errors() {
        let hash = TxHash([0xab; 32]);
        let mut calls = 0;
        let receipt = poll_receipt(&hash, Duration::from_millis(100), Duration::from_secs(5), || {
            calls += 1;
            let attempt = calls;
            async move {
                match attempt {
                    1 | 2 => Err(ChainError::Rpc("connection reset".into())),
                    3 => Ok(None),
                    _ => Ok(Some(mined(hash))),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(receipt.block_number, 7);
        assert_eq!(calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_when_rpc_stays_down() {
        let hash = TxHash([0xab; 32]);
        let err = poll_receipt(&hash, Duration::from_millis(100), Duration::from_secs(2), || async {
            Err::<Option<Receipt>, _>(ChainError::Rpc("down".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::ConfirmationTimeout { waited_secs: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_stops_on_decode_error() {
        let hash = TxHash([0xab; 32]);
        let err = poll_receipt(&hash, Duration::from_millis(100), Duration::from_secs(2), || async {
            Err::<Option<Receipt>, _>(ChainError::Decode("bad status".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err, ChainError::Decode("bad status".into()));
    }

    #[test]
    fn receipt_json_shape() {
        let raw = json!({
            "transactionHash": format!("0x{}", "01".repeat(32)),
            "blockNumber": "0x1b4",
            "status": "0x1",
            "gasUsed": "0x5208",
        });
        let parsed: RpcReceipt = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.into_receipt().unwrap().unwrap().block_number, 436);
    }
}
