//! Entry point for the catalog: fingerprint a stored file and append the
//! result to the ledger.

use folio_fingerprint::{AlgorithmVersion, Fingerprint, FingerprintError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Error;
use crate::ledger::ChecksumLedger;
use crate::types::{DocumentId, Format, NewChecksum};

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("failed to fingerprint {}: {source}", path.display())]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: FingerprintError,
    },

    /// The ledger refused the record, e.g. a fingerprint of the wrong length
    /// for its algorithm.
    #[error("invalid checksum: {0}")]
    Invalid(#[source] Error),

    #[error(transparent)]
    Storage(Error),
}

impl From<Error> for ChecksumError {
    fn from(error: Error) -> Self {
        if error.is_invalid_input() {
            ChecksumError::Invalid(error)
        } else {
            ChecksumError::Storage(error)
        }
    }
}

/// Fingerprint `path` with the current algorithm and record it as the newest
/// checksum of `(document, format)`.
///
/// Nothing is appended when fingerprinting fails.
pub async fn record_checksum(
    ledger: &dyn ChecksumLedger,
    document: DocumentId,
    format: Format,
    path: impl AsRef<Path>,
) -> Result<Fingerprint, ChecksumError> {
    record_checksum_with_algorithm(ledger, document, format, path, AlgorithmVersion::default())
        .await
}

pub async fn record_checksum_with_algorithm(
    ledger: &dyn ChecksumLedger,
    document: DocumentId,
    format: Format,
    path: impl AsRef<Path>,
    algorithm: AlgorithmVersion,
) -> Result<Fingerprint, ChecksumError> {
    let path = path.as_ref().to_path_buf();

    let fingerprint = {
        let path = path.clone();
        let algorithm = algorithm.clone();
        tokio::task::spawn_blocking(move || algorithm.compute(&path))
            .await
            .map_err(Error::from)?
    };
    let fingerprint = match fingerprint {
        Ok(fingerprint) => fingerprint,
        Err(source) => {
            warn!(%document, %format, path = %path.display(), error = %source, "Could not fingerprint file");
            return Err(ChecksumError::Fingerprint { path, source });
        }
    };

    let id = ledger
        .append(NewChecksum::new(
            document.clone(),
            format.clone(),
            fingerprint.clone(),
            algorithm,
        )?)
        .await?;

    info!(%document, %format, %fingerprint, id, "Recorded checksum");
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::setup_test_db;

    fn pair() -> (DocumentId, Format) {
        (DocumentId::new("42").unwrap(), Format::new("epub").unwrap())
    }

    #[tokio::test]
    async fn records_fingerprint_of_file() {
        let (dir, db) = setup_test_db().await;
        let path = dir.path().join("book.epub");
        std::fs::write(&path, b"a small book").unwrap();
        let (document, format) = pair();

        let fingerprint = record_checksum(&db, document.clone(), format.clone(), &path)
            .await
            .unwrap();

        let latest = db.latest(&document, &format).await.unwrap().unwrap();
        assert_eq!(latest.fingerprint, fingerprint);
        assert_eq!(latest.algorithm, AlgorithmVersion::Koreader);
        assert_eq!(fingerprint, folio_fingerprint::fingerprint(&path).unwrap());
    }

    #[tokio::test]
    async fn edited_file_gets_new_latest_but_old_fingerprint_still_resolves() {
        let (dir, db) = setup_test_db().await;
        let path = dir.path().join("book.epub");
        let (document, format) = pair();

        std::fs::write(&path, b"first edition").unwrap();
        let old = record_checksum(&db, document.clone(), format.clone(), &path)
            .await
            .unwrap();
        std::fs::write(&path, b"second edition, with fixes").unwrap();
        let new = record_checksum(&db, document.clone(), format.clone(), &path)
            .await
            .unwrap();

        assert_ne!(old, new);
        assert_eq!(db.latest(&document, &format).await.unwrap().unwrap().fingerprint, new);
        assert_eq!(db.history(&document, &format).await.unwrap().len(), 2);
        assert_eq!(db.resolve(&old).await.unwrap().unwrap().document, document);
    }

    #[tokio::test]
    async fn empty_file_appends_nothing() {
        let (dir, db) = setup_test_db().await;
        let path = dir.path().join("empty.epub");
        std::fs::write(&path, b"").unwrap();
        let (document, format) = pair();

        let error = record_checksum(&db, document.clone(), format.clone(), &path)
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            ChecksumError::Fingerprint {
                source: FingerprintError::Empty,
                ..
            }
        ));
        assert!(db.history(&document, &format).await.unwrap().is_empty());
    }

    #[test]
    fn input_errors_are_not_storage_faults() {
        let length = Error::FingerprintLength {
            algorithm: AlgorithmVersion::Koreader,
            expected: 32,
            actual: 64,
        };

        assert!(matches!(
            ChecksumError::from(length),
            ChecksumError::Invalid(Error::FingerprintLength { .. })
        ));
        assert!(matches!(
            ChecksumError::from(Error::Storage(sqlx::Error::PoolClosed)),
            ChecksumError::Storage(_)
        ));
    }

    #[tokio::test]
    async fn closed_store_is_a_storage_fault() {
        let (dir, db) = setup_test_db().await;
        let path = dir.path().join("book.epub");
        std::fs::write(&path, b"content").unwrap();
        let (document, format) = pair();
        db.close().await;

        let error = record_checksum(&db, document, format, &path)
            .await
            .unwrap_err();

        assert!(matches!(error, ChecksumError::Storage(_)));
    }

    #[tokio::test]
    async fn unknown_algorithm_is_refused() {
        let (dir, db) = setup_test_db().await;
        let path = dir.path().join("book.epub");
        std::fs::write(&path, b"content").unwrap();
        let (document, format) = pair();

        let error = record_checksum_with_algorithm(
            &db,
            document,
            format,
            &path,
            AlgorithmVersion::from("sha256-full"),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            error,
            ChecksumError::Fingerprint {
                source: FingerprintError::UnsupportedAlgorithm(_),
                ..
            }
        ));
    }
}
