//! Calldata builders and return decoders for the deployed artifact
//! interfaces.

use {
    crate::{
        dataset::{LockedRow, RevealedRow, UnrevealedRow},
        error::Result,
    },
    alloy::{
        primitives::{Address, B256, Bytes, U256},
        sol,
        sol_types::SolCall,
    },
    anyhow::Context,
};

sol! {
    interface ICollection {
        function mintUnrevealedBatch(address[] holders, uint256[] counts) external;
        function revealBatch(uint256[] tokenIds, bytes32[] seeds) external;
        function unrevealedCount(address holder) external view returns (uint256);
        function seedOf(uint256 tokenId) external view returns (bytes32);
    }

    interface IToken {
        function mintLockedBatch(address[] holders, uint256[] amounts) external;
        function lockedBalanceOf(address holder) external view returns (uint256);
    }
}

pub fn mint_unrevealed(batch: &[UnrevealedRow]) -> Bytes {
    ICollection::mintUnrevealedBatchCall {
        holders: batch.iter().map(|row| row.holder).collect(),
        counts: batch.iter().map(|row| row.count).collect(),
    }
    .abi_encode()
    .into()
}

pub fn reveal(batch: &[RevealedRow]) -> Result<Bytes> {
    Ok(ICollection::revealBatchCall {
        tokenIds: batch.iter().map(|row| row.token_id).collect(),
        seeds: batch
            .iter()
            .map(|row| row.seed_word())
            .collect::<Result<_>>()?,
    }
    .abi_encode()
    .into())
}

pub fn mint_locked(batch: &[LockedRow]) -> Result<Bytes> {
    Ok(IToken::mintLockedBatchCall {
        holders: batch.iter().map(|row| row.holder).collect(),
        amounts: batch
            .iter()
            .map(|row| row.amount_value())
            .collect::<Result<_>>()?,
    }
    .abi_encode()
    .into())
}

pub fn unrevealed_count(holder: Address) -> Bytes {
    ICollection::unrevealedCountCall { holder }.abi_encode().into()
}

pub fn decode_unrevealed_count(data: &[u8]) -> Result<U256> {
    Ok(ICollection::unrevealedCountCall::abi_decode_returns(data)
        .context("decoding unrevealedCount return")?)
}

pub fn seed_of(token_id: U256) -> Bytes {
    ICollection::seedOfCall { tokenId: token_id }.abi_encode().into()
}

pub fn decode_seed(data: &[u8]) -> Result<B256> {
    Ok(ICollection::seedOfCall::abi_decode_returns(data).context("decoding seedOf return")?)
}

pub fn locked_balance(holder: Address) -> Bytes {
    IToken::lockedBalanceOfCall { holder }.abi_encode().into()
}

pub fn decode_locked_balance(data: &[u8]) -> Result<U256> {
    Ok(IToken::lockedBalanceOfCall::abi_decode_returns(data)
        .context("decoding lockedBalanceOf return")?)
}
