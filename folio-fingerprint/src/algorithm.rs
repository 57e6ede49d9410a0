use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::{Fingerprint, FingerprintError};

const KOREADER: &str = "koreader";

/// Tag recorded next to every stored fingerprint naming the algorithm that
/// produced it.
///
/// Tags this build does not know are kept verbatim in [`AlgorithmVersion::Unknown`]
/// so rows written by newer software still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlgorithmVersion {
    /// Sparse MD5 sampling, see [`crate::fingerprint`].
    #[default]
    Koreader,
    Unknown(String),
}

impl AlgorithmVersion {
    pub fn as_str(&self) -> &str {
        match self {
            AlgorithmVersion::Koreader => KOREADER,
            AlgorithmVersion::Unknown(tag) => tag,
        }
    }

    /// Length in hex characters of the fingerprints this algorithm produces,
    /// if known.
    pub fn expected_len(&self) -> Option<usize> {
        match self {
            AlgorithmVersion::Koreader => Some(32),
            AlgorithmVersion::Unknown(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, AlgorithmVersion::Unknown(_))
    }

    pub fn compute(&self, path: impl AsRef<Path>) -> Result<Fingerprint, FingerprintError> {
        match self {
            AlgorithmVersion::Koreader => crate::fingerprint(path),
            AlgorithmVersion::Unknown(tag) => {
                Err(FingerprintError::UnsupportedAlgorithm(tag.clone()))
            }
        }
    }
}

impl fmt::Display for AlgorithmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AlgorithmVersion {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            KOREADER => AlgorithmVersion::Koreader,
            _ => AlgorithmVersion::Unknown(tag),
        }
    }
}

impl From<&str> for AlgorithmVersion {
    fn from(tag: &str) -> Self {
        AlgorithmVersion::from(tag.to_owned())
    }
}

impl From<AlgorithmVersion> for String {
    fn from(version: AlgorithmVersion) -> Self {
        match version {
            AlgorithmVersion::Koreader => KOREADER.to_owned(),
            AlgorithmVersion::Unknown(tag) => tag,
        }
    }
}

impl FromStr for AlgorithmVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(AlgorithmVersion::from(s))
    }
}
