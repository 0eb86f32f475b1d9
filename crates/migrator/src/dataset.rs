//! Typed readers for the ops-curated CSV datasets.
//!
//! Each dataset is read fully into memory before any remote call is made, so
//! a malformed file aborts the run before it can touch remote state.

use {
    crate::{
        error::{Error, Result},
        loader::SourceRecord,
        reconcile::{Reconcilable, StateView},
    },
    alloy::primitives::{Address, B256, U256, hex},
    anyhow::Context,
    serde::Deserialize,
    serde_with::serde_as,
    std::path::Path,
};

/// Holders whose tokens are still unrevealed, with their token count.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnrevealedRow {
    pub holder: Address,
    #[serde_as(as = "number::serialization::U256")]
    pub count: U256,
}

impl SourceRecord for UnrevealedRow {
    type Key = Address;

    fn subject_key(&self) -> Address {
        self.holder
    }
}

impl Reconcilable for UnrevealedRow {
    fn subject(&self) -> String {
        self.holder.to_string()
    }

    fn expected(&self) -> StateView {
        StateView::default().field(
            "unrevealed_count",
            number::conversions::u256_to_decimal(&self.count),
        )
    }
}

/// Revealed tokens with their reveal seed. The subject is the (holder, token)
/// pair; one holder may own many revealed tokens.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RevealedRow {
    pub holder: Address,
    #[serde_as(as = "number::serialization::U256")]
    pub token_id: U256,
    /// Hex seed as exported, possibly with an odd digit count.
    pub seed: String,
}

impl RevealedRow {
    /// The seed as a 32-byte word for submission. Exports with an odd digit
    /// count get one zero nibble appended; shorter values are left-padded.
    pub fn seed_word(&self) -> Result<B256> {
        let digits = self.seed.strip_prefix("0x").unwrap_or(&self.seed);
        let even;
        let digits = if digits.len() % 2 == 1 {
            even = format!("{digits}0");
            &even
        } else {
            digits
        };
        let bytes = hex::decode(digits)
            .map_err(|err| Error::Precondition(format!("invalid seed {:?}: {err}", self.seed)))?;
        if bytes.len() > 32 {
            return Err(Error::Precondition(format!(
                "seed {:?} exceeds 32 bytes",
                self.seed
            )));
        }
        let mut word = B256::ZERO;
        word[32 - bytes.len()..].copy_from_slice(&bytes);
        Ok(word)
    }
}

impl SourceRecord for RevealedRow {
    type Key = (Address, U256);

    fn subject_key(&self) -> (Address, U256) {
        (self.holder, self.token_id)
    }
}

impl Reconcilable for RevealedRow {
    fn subject(&self) -> String {
        format!("{}/{}", self.holder, self.token_id)
    }

    fn expected(&self) -> StateView {
        // Compare against the exact word the load submits, so a seed that
        // needed nibble padding still verifies. A seed that does not decode
        // keeps its raw form and surfaces as a mismatch.
        let seed = self
            .seed_word()
            .map(|word| word.to_string())
            .unwrap_or_else(|_| self.seed.clone());
        StateView::default().field("seed", seed)
    }
}

/// Holders with a locked companion-token balance. The amount column may be
/// empty, meaning zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockedRow {
    pub holder: Address,
    #[serde(default)]
    pub amount: String,
}

impl LockedRow {
    pub fn amount_value(&self) -> Result<U256> {
        if self.amount.trim().is_empty() {
            return Ok(U256::ZERO);
        }
        Ok(number::conversions::u256_from_decimal(&self.amount)?)
    }
}

impl SourceRecord for LockedRow {
    type Key = Address;

    fn subject_key(&self) -> Address {
        self.holder
    }
}

impl Reconcilable for LockedRow {
    fn subject(&self) -> String {
        self.holder.to_string()
    }

    fn expected(&self) -> StateView {
        StateView::default().field("locked_amount", &self.amount)
    }
}

/// Bare holder list, used by the raw storage comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SubjectRow {
    pub holder: Address,
}

/// Reads all rows of a headered CSV file. A row that fails to deserialize is
/// a precondition error naming the file and the 1-based line number.
pub fn read_records<R>(path: &Path) -> Result<Vec<R>>
where
    R: serde::de::DeserializeOwned,
{
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening dataset {}", path.display()))?;
    let mut rows = Vec::new();
    for (index, row) in reader.deserialize().enumerate() {
        // Line 1 is the header.
        let line = index + 2;
        let row = row.map_err(|err| {
            Error::Precondition(format!(
                "malformed row at {}:{line}: {err}",
                path.display()
            ))
        })?;
        rows.push(row);
    }
    tracing::debug!(path = %path.display(), rows = rows.len(), "dataset loaded");
    Ok(rows)
}
