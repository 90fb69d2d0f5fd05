use alloy::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    json_abi::Function,
    network::ReceiptResponse,
    primitives::{Address, Bytes, TxHash, U64},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{TransactionInput, TransactionRequest},
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::TransactionInfo;
use crate::config::NetworkConfig;
use crate::error::DispatchError;

/// A contract function together with the arguments to call it with.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub function: Function,
    pub args: Vec<DynSolValue>,
}

impl MethodCall {
    pub fn encode(&self) -> Result<Bytes, DispatchError> {
        self.function
            .abi_encode_input(&self.args)
            .map(Bytes::from)
            .map_err(|e| DispatchError::InvalidParams(format!("Failed to encode inputs: {}", e)))
    }
}

/// What the dispatcher needs from a node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn network_id(&self) -> Result<u64, DispatchError>;

    async fn chain_id(&self) -> Result<u64, DispatchError>;

    async fn accounts(&self) -> Result<Vec<Address>, DispatchError>;

    /// Transaction count of `address` including the pending pool.
    async fn pending_nonce(&self, address: Address) -> Result<u64, DispatchError>;

    async fn gas_price(&self) -> Result<u128, DispatchError>;

    /// Gas limit of the latest block, `None` when the node has no block yet.
    async fn latest_gas_limit(&self) -> Result<Option<u64>, DispatchError>;

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, DispatchError>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, DispatchError>;

    /// Submits an unsigned call; the node or its wallet signs it.
    async fn send_contract_call(
        &self,
        tx: TransactionRequest,
        call: &MethodCall,
    ) -> Result<TxHash, DispatchError>;

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionInfo, DispatchError>;
}

#[derive(Debug, Deserialize)]
struct LatestBlock {
    #[serde(rename = "gasLimit")]
    gas_limit: U64,
}

/// JSON-RPC client over HTTP.
#[derive(Debug, Clone)]
pub struct AlloyChainClient {
    provider: RootProvider<Http<Client>>,
    poll_interval: Duration,
}

impl AlloyChainClient {
    pub fn new(network_config: &NetworkConfig, poll_interval: Duration) -> anyhow::Result<Self> {
        let url = network_config.rpc_url.parse().map_err(|e| {
            anyhow::anyhow!("Invalid RPC URL '{}': {}", network_config.rpc_url, e)
        })?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            poll_interval,
        })
    }

    /// Fails with an actionable message when the endpoint does not answer.
    pub async fn check_connection(&self) -> Result<u64, DispatchError> {
        self.provider.get_block_number().await.map_err(|e| {
            DispatchError::ChainRpc(format!(
                "Cannot connect to the RPC endpoint: {}",
                crate::ethereum::utils::interpret_rpc_error(&e.to_string())
            ))
        })
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn network_id(&self) -> Result<u64, DispatchError> {
        self.provider.get_net_version().await.map_err(DispatchError::rpc)
    }

    async fn chain_id(&self) -> Result<u64, DispatchError> {
        self.provider.get_chain_id().await.map_err(DispatchError::rpc)
    }

    async fn accounts(&self) -> Result<Vec<Address>, DispatchError> {
        self.provider.get_accounts().await.map_err(DispatchError::rpc)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, DispatchError> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(DispatchError::rpc)
    }

    async fn gas_price(&self) -> Result<u128, DispatchError> {
        self.provider.get_gas_price().await.map_err(DispatchError::rpc)
    }

    async fn latest_gas_limit(&self) -> Result<Option<u64>, DispatchError> {
        let block: Option<LatestBlock> = self
            .provider
            .client()
            .request("eth_getBlockByNumber", ("latest", false))
            .await
            .map_err(DispatchError::rpc)?;

        Ok(block.map(|block| block.gas_limit.to::<u64>()))
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, DispatchError> {
        self.provider.call(tx).await.map_err(DispatchError::rpc)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, DispatchError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(DispatchError::rpc)?;
        Ok(*pending.tx_hash())
    }

    async fn send_contract_call(
        &self,
        mut tx: TransactionRequest,
        call: &MethodCall,
    ) -> Result<TxHash, DispatchError> {
        // Older nodes only read `data`, newer ones prefer `input`.
        tx.input = TransactionInput::both(call.encode()?);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(DispatchError::rpc)?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionInfo, DispatchError> {
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(DispatchError::rpc)?;

            if let Some(receipt) = receipt {
                return Ok(TransactionInfo {
                    hash: format!("0x{:x}", receipt.transaction_hash),
                    from: format!("0x{:x}", receipt.from),
                    to: receipt.to.map(|to| format!("0x{:x}", to)),
                    gas_used: receipt.gas_used() as u64,
                    gas_price: receipt.effective_gas_price.to_string(),
                    block_number: receipt.block_number.unwrap_or_default(),
                    status: receipt.status(),
                });
            }

            debug!("Receipt for 0x{:x} not available yet", hash);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
