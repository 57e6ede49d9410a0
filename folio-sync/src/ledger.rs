//! The checksum ledger: every fingerprint ever produced for a document.
//!
//! Rows are only ever inserted. Two appends of the same bytes produce two
//! rows; "latest" means greatest `created_at`, then greatest id.

use async_trait::async_trait;
use folio_fingerprint::Fingerprint;

use crate::error::Result;
use crate::types::{ChecksumRecord, DocumentId, Format, NewChecksum, Resolution};

#[async_trait]
pub trait ChecksumLedger: Send + Sync {
    /// Insert a new record and return its id. Never updates or deduplicates.
    async fn append(&self, checksum: NewChecksum) -> Result<i64>;

    /// Most recent record for the pair.
    async fn latest(&self, document: &DocumentId, format: &Format)
        -> Result<Option<ChecksumRecord>>;

    /// All records for the pair, newest first.
    async fn history(&self, document: &DocumentId, format: &Format)
        -> Result<Vec<ChecksumRecord>>;

    /// Owner of a fingerprint. When several records match, the most recently
    /// created one wins.
    async fn resolve(&self, fingerprint: &Fingerprint) -> Result<Option<Resolution>>;

    /// Latest record of every format of a document, ordered by format.
    async fn documents_for(&self, document: &DocumentId) -> Result<Vec<ChecksumRecord>>;
}
