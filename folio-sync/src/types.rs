use chrono::{DateTime, Utc};
use folio_fingerprint::{AlgorithmVersion, Fingerprint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const MAX_FORMAT_LEN: usize = 16;

/// Identity of a document in the external catalog. Never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidDocument);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

/// Representation format tag such as `EPUB` or `PDF`, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Format(String);

impl Format {
    pub fn new(tag: impl AsRef<str>) -> Result<Self> {
        let tag = tag.as_ref().trim();

        if tag.is_empty()
            || tag.len() > MAX_FORMAT_LEN
            || !tag.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Error::InvalidFormat(tag.to_owned()));
        }

        Ok(Self(tag.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Format {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.0
    }
}

/// A checksum about to be appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChecksum {
    pub document: DocumentId,
    pub format: Format,
    pub fingerprint: Fingerprint,
    pub algorithm: AlgorithmVersion,
}

impl NewChecksum {
    pub fn new(
        document: DocumentId,
        format: Format,
        fingerprint: Fingerprint,
        algorithm: AlgorithmVersion,
    ) -> Result<Self> {
        let checksum = Self {
            document,
            format,
            fingerprint,
            algorithm,
        };
        checksum.validate()?;
        Ok(checksum)
    }

    /// Checks the fingerprint length against what the algorithm produces.
    pub fn validate(&self) -> Result<()> {
        match self.algorithm.expected_len() {
            Some(expected) if expected != self.fingerprint.len() => {
                Err(Error::FingerprintLength {
                    algorithm: self.algorithm.clone(),
                    expected,
                    actual: self.fingerprint.len(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// A row of the checksum ledger. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub id: i64,
    pub document: DocumentId,
    pub format: Format,
    pub fingerprint: Fingerprint,
    pub algorithm: AlgorithmVersion,
    pub created_at: DateTime<Utc>,
}

/// The document and format a fingerprint belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub document: DocumentId,
    pub format: Format,
    pub algorithm: AlgorithmVersion,
}

impl From<ChecksumRecord> for Resolution {
    fn from(record: ChecksumRecord) -> Self {
        Self {
            document: record.document,
            format: record.format,
            algorithm: record.algorithm,
        }
    }
}

/// Reading position of a device, addressed by fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub fingerprint: Fingerprint,
    pub device: String,
    pub device_id: Option<String>,
    /// Completion, 0 to 100.
    pub percentage: f64,
    /// Opaque device-defined locator.
    pub position: String,
    /// Client-supplied Unix timestamp in seconds.
    pub updated: i64,
}

impl ProgressRecord {
    pub fn validate(&self) -> Result<()> {
        if !self.percentage.is_finite() || !(0.0..=100.0).contains(&self.percentage) {
            return Err(Error::InvalidPercentage(self.percentage));
        }
        Ok(())
    }
}

/// Result of a progress write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The stored record is newer; nothing was written.
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tags_are_upper_cased() {
        assert_eq!(Format::new("epub").unwrap().as_str(), "EPUB");
        assert_eq!(Format::new(" azw3 ").unwrap().as_str(), "AZW3");
    }

    #[test]
    fn malformed_format_tags_are_rejected() {
        assert!(Format::new("").is_err());
        assert!(Format::new("e-pub").is_err());
        assert!(Format::new("x".repeat(17)).is_err());
    }

    #[test]
    fn blank_document_ids_are_rejected() {
        assert!(DocumentId::new("  ").is_err());
        assert_eq!(DocumentId::new("42").unwrap().as_str(), "42");
    }

    #[test]
    fn koreader_checksums_must_be_32_characters() {
        let long = Fingerprint::parse("ab".repeat(32)).unwrap();

        let err = NewChecksum::new(
            DocumentId::new("1").unwrap(),
            Format::new("EPUB").unwrap(),
            long.clone(),
            AlgorithmVersion::Koreader,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::FingerprintLength {
                expected: 32,
                actual: 64,
                ..
            }
        ));

        let accepted = NewChecksum::new(
            DocumentId::new("1").unwrap(),
            Format::new("EPUB").unwrap(),
            long,
            AlgorithmVersion::from("sha256-full"),
        );
        assert!(accepted.is_ok());
    }

    #[test]
    fn percentage_must_be_within_bounds() {
        let mut record = ProgressRecord {
            fingerprint: Fingerprint::parse("0".repeat(32)).unwrap(),
            device: "Kobo".to_owned(),
            device_id: None,
            percentage: 42.5,
            position: "/body/DocFragment[3]".to_owned(),
            updated: 1,
        };
        assert!(record.validate().is_ok());

        record.percentage = 100.5;
        assert!(record.validate().is_err());

        record.percentage = f64::NAN;
        assert!(record.validate().is_err());
    }
}
