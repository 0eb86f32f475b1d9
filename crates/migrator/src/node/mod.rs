//! Boundary trait for the remote execution environment.
//!
//! Abstracts submission, confirmation and read-only access so the pipeline
//! core can be unit tested with mocks.

pub mod ethereum;

use {
    crate::error::{Error, Result},
    alloy::primitives::{Address, B256, Bytes, TxHash},
};

/// Opaque handle of a submitted state-changing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationHandle(pub TxHash);

/// A state-changing call against the remote execution environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Deploys new code. `code` already carries the ABI-encoded constructor
    /// arguments appended to the creation bytecode.
    Create { code: Bytes },
    /// Invokes a function on an existing artifact.
    Invoke { target: Address, calldata: Bytes },
}

/// Terminal outcome of a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub operation: OperationHandle,
    pub success: bool,
    pub block_number: u64,
    /// Address of the created artifact for [`Call::Create`] operations.
    pub deployed_address: Option<Address>,
}

impl Confirmation {
    /// Turns a failure status into [`Error::ConfirmationFailed`].
    pub fn ensure_success(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::ConfirmationFailed {
                operation: self.operation.0,
                block: self.block_number,
            })
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Node: Send + Sync {
    /// Submits a state-changing call and returns its operation handle.
    async fn submit(&self, call: Call) -> Result<OperationHandle>;

    /// Blocks until `operation` reaches a terminal status.
    async fn confirm(&self, operation: OperationHandle) -> Result<Confirmation>;

    /// Issues a read-only query against current (`block = None`) or
    /// historical state.
    async fn query(&self, target: Address, calldata: Bytes, block: Option<u64>) -> Result<Bytes>;

    /// Reads one raw 32-byte word of an artifact's persistent storage.
    async fn read_storage(&self, artifact: Address, slot: B256) -> Result<B256>;
}
