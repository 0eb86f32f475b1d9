//! Batch loading of a large ordered dataset into remote artifacts.
//!
//! The source is partitioned into fixed-size batches processed strictly in
//! order. The cursor checkpoint is persisted only after a batch's remote
//! operation is confirmed, so a restart resumes at the first record whose
//! batch is not known to have committed.

use {
    crate::{
        error::{Error, Result},
        node::Confirmation,
        retry::{self, RetryPolicy},
    },
    checkpoint::Store,
    serde::{Deserialize, Serialize},
    std::{collections::HashSet, fmt::Debug, future::Future, hash::Hash},
};

/// One row of an external source dataset.
pub trait SourceRecord {
    /// The dataset's declared identity column; used for deduplication and
    /// lookups.
    type Key: Eq + Hash + Clone + Debug;

    fn subject_key(&self) -> Self::Key;
}

/// Progress of one load operation. `cursor` is the index of the first
/// unprocessed source record; it never decreases and never exceeds the
/// source length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub cursor: usize,
}

pub struct BatchLoader<'a> {
    pub store: &'a Store,
    /// Deployment environment; partitions checkpoint slots.
    pub scope: String,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl BatchLoader<'_> {
    /// Loads `source` through `write_op`, resuming at the checkpointed
    /// cursor of `slot`.
    ///
    /// Duplicate subjects are suppressed per run: the first occurrence wins
    /// and later ones are dropped. The seen-set is not persisted, so a
    /// crash-and-resume cycle loses dedup history from before the crash.
    pub async fn run<R, F, Fut>(&self, slot: &str, source: &[R], write_op: F) -> Result<()>
    where
        R: SourceRecord + Clone,
        F: Fn(Vec<R>) -> Fut,
        Fut: Future<Output = Result<Confirmation>>,
    {
        self.execute(
            slot,
            source,
            write_op,
            None::<fn(R) -> std::future::Ready<Result<bool>>>,
        )
        .await
    }

    /// Like [`Self::run`], with a one-time "already written?" probe for
    /// composite datasets: when resuming at a non-zero cursor, `probe` is
    /// asked whether the first record of the resume batch already has its
    /// remote counterpart; if so the batch is skipped without re-submitting.
    /// Guards against double submission after a crash between a batch's
    /// confirmation and its checkpoint persist.
    pub async fn run_with_probe<R, F, Fut, P, PFut>(
        &self,
        slot: &str,
        source: &[R],
        write_op: F,
        probe: P,
    ) -> Result<()>
    where
        R: SourceRecord + Clone,
        F: Fn(Vec<R>) -> Fut,
        Fut: Future<Output = Result<Confirmation>>,
        P: Fn(R) -> PFut,
        PFut: Future<Output = Result<bool>>,
    {
        self.execute(slot, source, write_op, Some(probe)).await
    }

    async fn execute<R, F, Fut, P, PFut>(
        &self,
        slot: &str,
        source: &[R],
        write_op: F,
        probe: Option<P>,
    ) -> Result<()>
    where
        R: SourceRecord + Clone,
        F: Fn(Vec<R>) -> Fut,
        Fut: Future<Output = Result<Confirmation>>,
        P: Fn(R) -> PFut,
        PFut: Future<Output = Result<bool>>,
    {
        if self.batch_size == 0 {
            return Err(Error::Precondition("batch size must be positive".into()));
        }
        let mut progress = self
            .store
            .load::<BatchProgress>(&self.scope, slot)?
            .unwrap_or_default();
        if progress.cursor > source.len() {
            return Err(Error::Precondition(format!(
                "checkpointed cursor {} exceeds source length {}",
                progress.cursor,
                source.len()
            )));
        }
        tracing::info!(
            slot,
            cursor = progress.cursor,
            total = source.len(),
            "starting batch load"
        );
        if progress.cursor == source.len() {
            // Nothing left; still persist so a fresh empty load records
            // completion.
            self.store.save(&self.scope, slot, &progress)?;
            return Ok(());
        }

        // Duplicate suppression is scoped to this run; rebuilt empty on
        // resume.
        let mut seen: HashSet<R::Key> = HashSet::new();
        let mut probe_pending = probe.is_some() && progress.cursor > 0;
        let write_op = &write_op;

        while progress.cursor < source.len() {
            let end = usize::min(progress.cursor + self.batch_size, source.len());
            let batch: Vec<R> = source[progress.cursor..end]
                .iter()
                .filter(|record| seen.insert(record.subject_key()))
                .cloned()
                .collect();

            let mut skip_submission = batch.is_empty();
            if skip_submission {
                tracing::debug!(
                    slot,
                    cursor = progress.cursor,
                    "batch holds only duplicate subjects, skipping remote call"
                );
            } else if probe_pending {
                probe_pending = false;
                if let Some(probe) = &probe {
                    if probe(batch[0].clone()).await? {
                        tracing::info!(
                            slot,
                            cursor = progress.cursor,
                            subject = ?batch[0].subject_key(),
                            "resume batch is already written remotely, advancing past it"
                        );
                        skip_submission = true;
                    }
                }
            }

            if !skip_submission {
                retry::retry(self.retry, slot, || {
                    let batch = batch.clone();
                    async move {
                        write_op(batch).await?.ensure_success()?;
                        Ok(())
                    }
                })
                .await?;
                tracing::debug!(
                    slot,
                    from = progress.cursor,
                    to = end,
                    subjects = batch.len(),
                    "batch confirmed"
                );
            }

            // Persisted strictly after confirmation, never before.
            progress.cursor = end;
            self.store.save(&self.scope, slot, &progress)?;
        }
        tracing::info!(slot, cursor = progress.cursor, "load complete");
        Ok(())
    }
}
