//! Global Media Id (GMID) derivation.
//!
//! A GMID is a 32-character lowercase hex string derived from the SHA-256
//! digest of the original file bytes. Two uploads with identical content
//! collapse onto the same GMID; this is the identifier shared between the
//! filesystem, the metadata registry and the vector point id.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

const GMID_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Gmid(String);

#[derive(Debug, thiserror::Error)]
pub enum GmidError {
    #[error("GMID must be {GMID_LEN} lowercase hex characters, got {0:?}")]
    InvalidFormat(String)
}

impl Gmid {
    /// Derives a GMID from the content bytes of an uploaded file.
    ///
    /// The SHA-256 digest is 64 hex characters; the GMID takes the first 32.
    /// `truncated and padded` per the spec: sha256 never needs padding in
    /// practice, but the split keeps dimension stable if the hash function
    /// ever changes.
    #[must_use]
    pub fn from_content(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let full_hex = hex::encode(digest);
        let mut truncated: String = full_hex.chars().take(GMID_LEN).collect();
        while truncated.len() < GMID_LEN {
            truncated.push('0');
        }
        Self(truncated)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Gmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Gmid {
    type Err = GmidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == GMID_LEN && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()) {
            Ok(Self(s.to_string()))
        } else {
            Err(GmidError::InvalidFormat(s.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_yields_same_gmid() {
        let a = Gmid::from_content(b"hello world");
        let b = Gmid::from_content(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), GMID_LEN);
    }

    #[test]
    fn distinct_content_yields_distinct_gmid() {
        let a = Gmid::from_content(b"beach sunset");
        let b = Gmid::from_content(b"cat on sofa");
        assert_ne!(a, b);
    }

    #[test]
    fn parses_valid_hex() {
        let gmid = Gmid::from_content(b"round trip");
        let parsed: Gmid = gmid.as_str().parse().unwrap();
        assert_eq!(gmid, parsed);
    }

    #[test]
    fn rejects_wrong_length_and_case() {
        assert!("not-hex".parse::<Gmid>().is_err());
        assert!("A".repeat(32).parse::<Gmid>().is_err());
        assert!("f".repeat(31).parse::<Gmid>().is_err());
    }
}
