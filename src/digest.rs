//! SHA-256 content digest of a document.

use crate::core::PDFDocument;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    #[error("digest must be 64 hex characters, got {0}")]
    Length(usize),

    #[error("digest contains a non-hex character")]
    NotHex,
}

/// 64-character lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DigestHex {
    hex: String,
    bytes: [u8; 32],
}

impl DigestHex {
    fn from_bytes(bytes: [u8; 32]) -> Self {
        DigestHex {
            hex: hex::encode(bytes),
            bytes,
        }
    }

    /// Hashes `bytes`.
    pub fn compute(bytes: &[u8]) -> Self {
        Self::from_bytes(Sha256::digest(bytes).into())
    }

    /// Hashes the bytes the decoder was opened with.
    pub fn of_document(document: &PDFDocument) -> Self {
        Self::compute(document.data())
    }

    /// Parses 64 hex characters, with or without `0x`, into lowercase form.
    pub fn parse(input: &str) -> Result<Self, DigestError> {
        let body = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .unwrap_or(input);
        if body.len() != 64 {
            return Err(DigestError::Length(body.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(body, &mut bytes).map_err(|_| DigestError::NotHex)?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// The raw 32 digest bytes.
    pub fn as_bytes32(&self) -> [u8; 32] {
        self.bytes
    }

    /// `0x`-prefixed form, as handed to `personal_sign`.
    pub fn to_prefixed(&self) -> String {
        format!("0x{}", self.hex)
    }
}

impl fmt::Display for DigestHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl FromStr for DigestHex {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for DigestHex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex)
    }
}
