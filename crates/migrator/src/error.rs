//! Error taxonomy of the pipeline core.
//!
//! The core never terminates the process itself; every fatal condition is a
//! typed error and the binary decides the exit code.

use alloy::primitives::{Address, B256, TxHash, U256};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote operation was accepted but terminated in a failure status.
    /// Never retried: re-submitting a failed state-changing operation risks
    /// duplicate side effects.
    #[error("operation {operation} was confirmed as failed in block {block}")]
    ConfirmationFailed { operation: TxHash, block: u64 },

    /// Reconciliation found a divergence between the source dataset and
    /// remote state. Always fatal at the first occurrence.
    #[error(
        "state mismatch for subject {subject}, field {field:?}: expected {expected:?}, remote \
         {remote:?}"
    )]
    Mismatch {
        subject: String,
        field: String,
        expected: String,
        remote: String,
    },

    /// Two artifact instances disagree on a raw storage word.
    #[error(
        "storage mismatch for subject {subject} at slot index {slot_index}: left {left}, right \
         {right}"
    )]
    StorageMismatch {
        subject: Address,
        slot_index: U256,
        left: B256,
        right: B256,
    },

    /// A required input is missing or malformed. Detected before any remote
    /// call where possible.
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
