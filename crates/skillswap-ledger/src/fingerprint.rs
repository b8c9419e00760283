use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

pub const FINGERPRINT_LEN: usize = 32;

/// Fixed-width skill encoding stored on the ledger.
///
/// Only equality is meaningful. Whether a value can be turned back into text
/// depends on which encoding the ledger used when the record was written.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// One-way digest of skill text. Case and surrounding whitespace are
    /// ignored, the same way profile validation compares skills.
    #[must_use]
    pub fn digest(text: &str) -> Self {
        Self(*blake3::hash(text.trim().to_lowercase().as_bytes()).as_bytes())
    }

    /// Reversible bytes32 string encoding: UTF-8 bytes, zero padded, last byte
    /// reserved for the terminator.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::TooLong` if the trimmed text exceeds 31 bytes and
    /// `DecodeError::Empty` if nothing is left after trimming.
    pub fn encode_text(text: &str) -> Result<Self, DecodeError> {
        let bytes = text.trim().as_bytes();
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.len() > FINGERPRINT_LEN - 1 {
            return Err(DecodeError::TooLong(bytes.len()));
        }
        let mut out = [0u8; FINGERPRINT_LEN];
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Inverse of [`Fingerprint::encode_text`].
    ///
    /// Digests almost always fail here; that is the expected outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a terminated, non-empty UTF-8
    /// bytes32 string.
    pub fn decode_text(&self) -> Result<String, DecodeError> {
        if self.0[FINGERPRINT_LEN - 1] != 0 {
            return Err(DecodeError::Unterminated);
        }
        let end = self
            .0
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |last| last + 1);
        let body = &self.0[..end];
        if body.is_empty() {
            return Err(DecodeError::Empty);
        }
        if body.contains(&0) {
            return Err(DecodeError::InteriorNul);
        }
        std::str::from_utf8(body)
            .map(str::to_owned)
            .map_err(|e| DecodeError::InvalidUtf8(e.valid_up_to()))
    }

    /// Canonical `0x`-prefixed lower-case hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fingerprint: {0}")]
pub struct ParseFingerprintError(String);

impl FromStr for Fingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        let mut out = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|e| ParseFingerprintError(format!("{s}: {e}")))?;
        Ok(Self(out))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
