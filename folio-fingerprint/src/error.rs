use std::io;
use std::path::PathBuf;

/// Reasons a fingerprint could not be produced.
///
/// An empty file is reported as [`FingerprintError::Empty`] rather than as the
/// digest of zero bytes, so callers can tell "nothing to sample" apart from a
/// real result and from an I/O failure.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("failed to open {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file is empty, nothing to sample")]
    Empty,

    #[error("failed to read sample window at offset {offset}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("sample window at offset {offset} was truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("no fingerprint engine for algorithm `{0}`")]
    UnsupportedAlgorithm(String),
}
