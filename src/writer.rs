use serde_json::Value;

use crate::error::FillError;
use crate::store::{BulkOp, BulkOutcome, DocumentStore};

/// Buffers changed documents and flushes them to the store in bounded bulk
/// requests. One writer lives for one tree depth, so every depth's writes form
/// a self-contained batch boundary.
pub struct BulkWriter<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    index: &'a str,
    op: BulkOp,
    batch_size: usize,
    dry_run: bool,
    pending: Vec<(String, Value)>,
    outcome: BulkOutcome,
}

impl<'a, S: DocumentStore + ?Sized> BulkWriter<'a, S> {
    pub fn new(
        store: &'a S,
        index: &'a str,
        op: BulkOp,
        batch_size: usize,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            index,
            op,
            batch_size: batch_size.max(1),
            dry_run,
            pending: Vec::new(),
            outcome: BulkOutcome::default(),
        }
    }

    pub fn push(&mut self, doc_id: String, doc: Value) -> Result<(), FillError> {
        self.pending.push((doc_id, doc));
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), FillError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let docs = std::mem::take(&mut self.pending);
        if self.dry_run {
            tracing::info!(count = docs.len(), "dry-run: skipping bulk write");
            return Ok(());
        }
        let outcome = self.store.bulk_write(self.index, self.op, &docs)?;
        if outcome.failed > 0 {
            tracing::warn!(
                failed = outcome.failed,
                written = outcome.written,
                "bulk write reported per-document failures"
            );
        }
        self.outcome.written += outcome.written;
        self.outcome.failed += outcome.failed;
        Ok(())
    }

    pub fn finish(mut self) -> Result<BulkOutcome, FillError> {
        self.flush()?;
        Ok(self.outcome)
    }
}
