use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MIN_LEN: usize = 32;
const MAX_LEN: usize = 128;

/// A validated fingerprint: lowercase hexadecimal, even length, 32 to 128
/// characters.
///
/// The only way to get one is through [`Fingerprint::parse`] (or the engine),
/// so anything holding a `Fingerprint` holds a well-formed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFingerprint {
    #[error("fingerprint must be between 32 and 128 characters, got {0}")]
    Length(usize),
    #[error("fingerprint must have an even number of hex digits, got {0}")]
    OddLength(usize),
    #[error("fingerprint must be lowercase hexadecimal, found {0:?}")]
    Character(char),
}

impl Fingerprint {
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidFingerprint> {
        let value = value.into();
        let len = value.len();

        if !(MIN_LEN..=MAX_LEN).contains(&len) {
            return Err(InvalidFingerprint::Length(len));
        }
        if len % 2 != 0 {
            return Err(InvalidFingerprint::OddLength(len));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !matches!(c, '0'..='9' | 'a'..='f'))
        {
            return Err(InvalidFingerprint::Character(c));
        }

        Ok(Self(value))
    }

    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = InvalidFingerprint;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_md5_sized_lowercase_hex() {
        let fp = Fingerprint::parse("0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(fp.len(), 32);
        assert_eq!(fp.to_string(), "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn rejects_uppercase() {
        let err = Fingerprint::parse("0123456789ABCDEF0123456789abcdef").unwrap_err();
        assert_eq!(err, InvalidFingerprint::Character('A'));
    }

    #[test]
    fn rejects_bad_lengths() {
        assert_eq!(
            Fingerprint::parse("abcd").unwrap_err(),
            InvalidFingerprint::Length(4)
        );
        assert_eq!(
            Fingerprint::parse("a".repeat(33)).unwrap_err(),
            InvalidFingerprint::OddLength(33)
        );
        assert!(Fingerprint::parse("").is_err());
    }

    #[test]
    fn deserialization_validates() {
        let ok: Result<Fingerprint, _> =
            serde_json::from_str("\"d41d8cd98f00b204e9800998ecf8427e\"");
        assert!(ok.is_ok());

        let bad: Result<Fingerprint, _> = serde_json::from_str("\"not-a-fingerprint\"");
        assert!(bad.is_err());
    }
}
