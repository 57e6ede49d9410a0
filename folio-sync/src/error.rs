use folio_fingerprint::{AlgorithmVersion, InvalidFingerprint};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("failed to run database migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(#[from] InvalidFingerprint),

    #[error("fingerprint has {actual} characters but `{algorithm}` produces {expected}")]
    FingerprintLength {
        algorithm: AlgorithmVersion,
        expected: usize,
        actual: usize,
    },

    #[error("invalid format tag {0:?}")]
    InvalidFormat(String),

    #[error("document id must not be blank")]
    InvalidDocument,

    #[error("percentage {0} is outside 0..=100")]
    InvalidPercentage(f64),

    #[error("corrupt row {id} in `{table}`: {reason}")]
    CorruptRow {
        table: &'static str,
        id: String,
        reason: String,
    },

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by
    /// storage or the runtime.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidFingerprint(_)
                | Error::FingerprintLength { .. }
                | Error::InvalidFormat(_)
                | Error::InvalidDocument
                | Error::InvalidPercentage(_)
        )
    }
}
