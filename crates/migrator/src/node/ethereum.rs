//! [`Node`] implementation over an Ethereum JSON-RPC provider.

use {
    super::{Call, Confirmation, Node, OperationHandle},
    crate::error::Result,
    alloy::{
        eips::BlockId,
        primitives::{Address, B256, Bytes, TxKind},
        providers::{DynProvider, Provider, ProviderBuilder},
        rpc::types::{TransactionInput, TransactionRequest},
        signers::local::PrivateKeySigner,
    },
    anyhow::{Context, anyhow},
    std::time::Duration,
    url::Url,
};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

pub struct EthereumNode {
    provider: DynProvider,
    from: Address,
}

impl EthereumNode {
    /// Provider with a local signer; required for state-changing commands.
    pub fn new(url: &Url, signer: PrivateKeySigner) -> Self {
        let from = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(signer)
            .connect_http(url.clone())
            .erased();
        Self { provider, from }
    }

    /// Provider without a signer; sufficient for the read-only phases.
    pub fn read_only(url: &Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();
        Self {
            provider,
            from: Address::ZERO,
        }
    }
}

#[async_trait::async_trait]
impl Node for EthereumNode {
    async fn submit(&self, call: Call) -> Result<OperationHandle> {
        let tx = match call {
            Call::Create { code } => TransactionRequest {
                from: Some(self.from),
                to: Some(TxKind::Create),
                input: TransactionInput::new(code),
                ..Default::default()
            },
            Call::Invoke { target, calldata } => TransactionRequest {
                from: Some(self.from),
                to: Some(TxKind::Call(target)),
                input: TransactionInput::new(calldata),
                ..Default::default()
            },
        };
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .context("transaction submission failed")?;
        Ok(OperationHandle(*pending.tx_hash()))
    }

    async fn confirm(&self, operation: OperationHandle) -> Result<Confirmation> {
        let deadline = tokio::time::Instant::now() + RECEIPT_TIMEOUT;
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(operation.0)
                .await
                .context("fetching transaction receipt")?;
            if let Some(receipt) = receipt {
                return Ok(Confirmation {
                    operation,
                    success: receipt.status(),
                    block_number: receipt.block_number.unwrap_or_default(),
                    deployed_address: receipt.contract_address,
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow!(
                    "operation {} was not confirmed within {RECEIPT_TIMEOUT:?}",
                    operation.0
                )
                .into());
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    async fn query(&self, target: Address, calldata: Bytes, block: Option<u64>) -> Result<Bytes> {
        let tx = TransactionRequest {
            to: Some(TxKind::Call(target)),
            input: TransactionInput::new(calldata),
            ..Default::default()
        };
        let call = self.provider.call(tx);
        let call = match block {
            Some(number) => call.block(BlockId::from(number)),
            None => call,
        };
        Ok(call.await.context("eth_call failed")?)
    }

    async fn read_storage(&self, artifact: Address, slot: B256) -> Result<B256> {
        let word = self
            .provider
            .get_storage_at(artifact, slot.into())
            .await
            .context("eth_getStorageAt failed")?;
        Ok(word.into())
    }
}
