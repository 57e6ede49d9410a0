use async_trait::async_trait;
use folio_fingerprint::Fingerprint;

use crate::error::Result;
use crate::types::{ProgressRecord, WriteOutcome};

/// Reading progress keyed purely by fingerprint.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ProgressRecord>>;

    /// Last write wins by the record's own timestamp. A write older than the
    /// stored record is a no-op reported as [`WriteOutcome::Stale`]. The
    /// comparison and the write happen atomically.
    async fn put(&self, record: ProgressRecord) -> Result<WriteOutcome>;
}
