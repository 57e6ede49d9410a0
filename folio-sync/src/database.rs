use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_fingerprint::{AlgorithmVersion, Fingerprint};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{ConnectOptions, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ledger::ChecksumLedger;
use crate::progress::ProgressStore;
use crate::types::{
    ChecksumRecord, DocumentId, Format, NewChecksum, ProgressRecord, Resolution, WriteOutcome,
};

const MAX_CONNECTIONS: u32 = 8;
/// Writers from other processes hold the lock briefly; wait for them instead
/// of failing with SQLITE_BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// Store handle shared by the checksum ledger and the progress store.
///
/// Constructed once at startup and handed to every component that needs it.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn open(path: impl AsRef<Path>, access_mode: AccessMode) -> Result<Self> {
        let path = path.as_ref();
        let read_only = matches!(access_mode, AccessMode::ReadOnly);

        if !read_only {
            folio_fs::ensure_directory_exists(path).map_err(sqlx::Error::Io)?;
        }

        let mut options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(!read_only)
            .read_only(read_only)
            .busy_timeout(BUSY_TIMEOUT)
            .disable_statement_logging();
        if !read_only {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        info!(path = %path.display(), ?access_mode, "Opened database");

        let db = Self { pool };
        if !read_only {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Database migration completed");
        Ok(())
    }

    /// Append with an explicit creation time instead of now.
    pub async fn append_at(&self, checksum: NewChecksum, created_at: DateTime<Utc>) -> Result<i64> {
        checksum.validate()?;

        let result = sqlx::query(
            r#"
            INSERT INTO checksums (document, format, fingerprint, algorithm, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(checksum.document.as_str())
        .bind(checksum.format.as_str())
        .bind(checksum.fingerprint.as_str())
        .bind(checksum.algorithm.as_str())
        .bind(created_at.timestamp_micros())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(
            id,
            document = %checksum.document,
            format = %checksum.format,
            fingerprint = %checksum.fingerprint,
            algorithm = %checksum.algorithm,
            "Appended checksum"
        );

        Ok(id)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(sqlx::FromRow)]
struct ChecksumRow {
    id: i64,
    document: String,
    format: String,
    fingerprint: String,
    algorithm: String,
    created_at: i64,
}

impl TryFrom<ChecksumRow> for ChecksumRecord {
    type Error = Error;

    fn try_from(row: ChecksumRow) -> Result<Self> {
        let corrupt = |reason: String| Error::CorruptRow {
            table: "checksums",
            id: row.id.to_string(),
            reason,
        };

        let created_at = DateTime::from_timestamp(
            row.created_at.div_euclid(1_000_000),
            (row.created_at.rem_euclid(1_000_000) * 1_000) as u32,
        )
        .ok_or_else(|| corrupt(format!("timestamp {} out of range", row.created_at)))?;

        Ok(ChecksumRecord {
            id: row.id,
            document: DocumentId::new(row.document.as_str()).map_err(|e| corrupt(e.to_string()))?,
            format: Format::new(&row.format).map_err(|e| corrupt(e.to_string()))?,
            fingerprint: Fingerprint::parse(row.fingerprint.as_str())
                .map_err(|e| corrupt(e.to_string()))?,
            algorithm: AlgorithmVersion::from(row.algorithm.as_str()),
            created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    fingerprint: String,
    device: String,
    device_id: Option<String>,
    percentage: f64,
    position: String,
    updated: i64,
}

impl TryFrom<ProgressRow> for ProgressRecord {
    type Error = Error;

    fn try_from(row: ProgressRow) -> Result<Self> {
        let fingerprint =
            Fingerprint::parse(row.fingerprint.as_str()).map_err(|e| Error::CorruptRow {
                table: "progress",
                id: row.fingerprint.clone(),
                reason: e.to_string(),
            })?;

        Ok(ProgressRecord {
            fingerprint,
            device: row.device,
            device_id: row.device_id,
            percentage: row.percentage,
            position: row.position,
            updated: row.updated,
        })
    }
}

#[async_trait]
impl ChecksumLedger for SqliteDatabase {
    async fn append(&self, checksum: NewChecksum) -> Result<i64> {
        self.append_at(checksum, Utc::now()).await
    }

    async fn latest(
        &self,
        document: &DocumentId,
        format: &Format,
    ) -> Result<Option<ChecksumRecord>> {
        let row = sqlx::query_as::<_, ChecksumRow>(
            r#"
            SELECT id, document, format, fingerprint, algorithm, created_at
            FROM checksums
            WHERE document = ? AND format = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(document.as_str())
        .bind(format.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ChecksumRecord::try_from).transpose()
    }

    async fn history(
        &self,
        document: &DocumentId,
        format: &Format,
    ) -> Result<Vec<ChecksumRecord>> {
        let rows = sqlx::query_as::<_, ChecksumRow>(
            r#"
            SELECT id, document, format, fingerprint, algorithm, created_at
            FROM checksums
            WHERE document = ? AND format = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(document.as_str())
        .bind(format.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChecksumRecord::try_from).collect()
    }

    async fn resolve(&self, fingerprint: &Fingerprint) -> Result<Option<Resolution>> {
        let row = sqlx::query_as::<_, ChecksumRow>(
            r#"
            SELECT id, document, format, fingerprint, algorithm, created_at
            FROM checksums
            WHERE fingerprint = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let resolution = row
            .map(ChecksumRecord::try_from)
            .transpose()?
            .map(Resolution::from);

        if resolution.is_none() {
            debug!(%fingerprint, "Fingerprint does not resolve to any document");
        }

        Ok(resolution)
    }

    async fn documents_for(&self, document: &DocumentId) -> Result<Vec<ChecksumRecord>> {
        let rows = sqlx::query_as::<_, ChecksumRow>(
            r#"
            SELECT c.id, c.document, c.format, c.fingerprint, c.algorithm, c.created_at
            FROM checksums c
            WHERE c.document = ?
              AND c.id = (
                SELECT c2.id
                FROM checksums c2
                WHERE c2.document = c.document AND c2.format = c.format
                ORDER BY c2.created_at DESC, c2.id DESC
                LIMIT 1
              )
            ORDER BY c.format
            "#,
        )
        .bind(document.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChecksumRecord::try_from).collect()
    }
}

#[async_trait]
impl ProgressStore for SqliteDatabase {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ProgressRecord>> {
        let row = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT fingerprint, device, device_id, percentage, position, updated
            FROM progress
            WHERE fingerprint = ?
            "#,
        )
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProgressRecord::try_from).transpose()
    }

    async fn put(&self, record: ProgressRecord) -> Result<WriteOutcome> {
        record.validate()?;

        // Single statement: the timestamp comparison and the write cannot
        // interleave with another writer.
        let result = sqlx::query(
            r#"
            INSERT INTO progress (fingerprint, device, device_id, percentage, position, updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                device = excluded.device,
                device_id = excluded.device_id,
                percentage = excluded.percentage,
                position = excluded.position,
                updated = excluded.updated
            WHERE excluded.updated >= progress.updated
            "#,
        )
        .bind(record.fingerprint.as_str())
        .bind(&record.device)
        .bind(record.device_id.as_deref())
        .bind(record.percentage)
        .bind(&record.position)
        .bind(record.updated)
        .execute(&self.pool)
        .await?;

        let outcome = if result.rows_affected() > 0 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Stale
        };
        debug!(
            fingerprint = %record.fingerprint,
            device = %record.device,
            updated = record.updated,
            ?outcome,
            "Stored progress"
        );

        Ok(outcome)
    }
}
