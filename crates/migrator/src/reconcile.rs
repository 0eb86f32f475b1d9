//! Reconciliation of source datasets against live remote state.
//!
//! Two families of checks, both pure reads: field-level comparison of typed
//! views ([`verify`]) and raw storage-word comparison between two artifact
//! instances ([`compare_storage`]). Both stop at the first divergence.

use {
    crate::{
        error::{Error, Result},
        node::Node,
    },
    alloy::primitives::{Address, B256, U256, keccak256},
    std::{collections::HashSet, future::Future},
};

/// One named field of an artifact's observable state, as a string in the
/// dataset's own notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub value: String,
}

/// A named-field snapshot of one subject's state, either as the source
/// dataset declares it or as the remote artifact reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateView {
    fields: Vec<Field>,
}

impl StateView {
    pub fn field(mut self, name: &'static str, value: impl ToString) -> Self {
        self.fields.push(Field {
            name,
            value: value.to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }
}

/// A source record that declares the remote state it expects.
pub trait Reconcilable {
    /// Subject identity for error reporting.
    fn subject(&self) -> String;

    /// The field values this record expects the remote artifact to report.
    fn expected(&self) -> StateView;
}

/// Compares every record of `source` against the remote view fetched by
/// `query`, field by field. The first divergence aborts the pass with
/// [`Error::Mismatch`]; records after it are never fetched.
pub async fn verify<R, Q, Fut>(source: &[R], query: Q) -> Result<()>
where
    R: Reconcilable,
    Q: Fn(&R) -> Fut,
    Fut: Future<Output = Result<StateView>>,
{
    for (index, record) in source.iter().enumerate() {
        let remote = query(record).await?;
        for field in record.expected().fields() {
            let remote_value = remote.get(field.name).ok_or_else(|| {
                Error::Precondition(format!(
                    "remote view of subject {} lacks field {:?}",
                    record.subject(),
                    field.name
                ))
            })?;
            if !values_match(&field.value, remote_value) {
                return Err(Error::Mismatch {
                    subject: record.subject(),
                    field: field.name.to_string(),
                    expected: field.value.clone(),
                    remote: remote_value.to_string(),
                });
            }
        }
        tracing::debug!(index, subject = record.subject(), "record reconciled");
    }
    tracing::info!(records = source.len(), "reconciliation pass clean");
    Ok(())
}

/// Value equality under the dataset's loose notation:
///
/// - numeric values compare by canonical decimal value, so `"007"` matches
///   `"7"`,
/// - an empty source cell matches a remote zero,
/// - `0x` fixed-width values match verbatim (case-insensitive) or after
///   appending one trailing zero nibble to the source value, covering
///   exporters that strip the last nibble of even-length words.
fn values_match(source: &str, remote: &str) -> bool {
    if source.is_empty() {
        return is_zero(remote);
    }
    if let (Some(source), Some(remote)) = (decimal(source), decimal(remote)) {
        return source == remote;
    }
    if source.starts_with("0x") && remote.starts_with("0x") {
        let source = source.to_ascii_lowercase();
        let remote = remote.to_ascii_lowercase();
        return source == remote || format!("{source}0") == remote;
    }
    source == remote
}

fn decimal(value: &str) -> Option<U256> {
    number::conversions::u256_from_decimal(value).ok()
}

fn is_zero(value: &str) -> bool {
    if let Some(value) = decimal(value) {
        return value.is_zero();
    }
    value
        .strip_prefix("0x")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b == b'0'))
}

/// Storage slot of `mapping(address => ...)` entry `subject` when the mapping
/// head occupies `slot_index`: the hash of the 64-byte concatenation of both
/// values, each left-padded to 32 bytes big-endian.
pub fn mapping_slot(subject: Address, slot_index: U256) -> B256 {
    let mut buffer = [0u8; 64];
    buffer[12..32].copy_from_slice(subject.as_slice());
    buffer[32..64].copy_from_slice(&slot_index.to_be_bytes::<32>());
    keccak256(buffer)
}

/// Reads the derived mapping slots of every (subject, slot index) pair from
/// both artifacts and requires byte equality. Subjects are deduplicated
/// first; the first differing word aborts with [`Error::StorageMismatch`].
pub async fn compare_storage(
    node: &dyn Node,
    subjects: &[Address],
    slot_indices: &[U256],
    left: Address,
    right: Address,
) -> Result<()> {
    let mut seen = HashSet::new();
    let subjects: Vec<Address> = subjects
        .iter()
        .copied()
        .filter(|subject| seen.insert(*subject))
        .collect();
    tracing::info!(
        subjects = subjects.len(),
        slots = slot_indices.len(),
        %left,
        %right,
        "comparing raw storage"
    );
    for subject in subjects {
        for &slot_index in slot_indices {
            let slot = mapping_slot(subject, slot_index);
            let left_word = node.read_storage(left, slot).await?;
            let right_word = node.read_storage(right, slot).await?;
            if left_word != right_word {
                return Err(Error::StorageMismatch {
                    subject,
                    slot_index,
                    left: left_word,
                    right: right_word,
                });
            }
        }
    }
    Ok(())
}
