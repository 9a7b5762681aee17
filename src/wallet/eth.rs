//! Ethereum primitives used by the wallet layer: keccak-256, addresses with
//! EIP-55 checksums, the EIP-191 personal message hash and 65-byte
//! recoverable signatures.

use k256::AffinePoint;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EthError {
    #[error("invalid hex: {0}")]
    Hex(String),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("address checksum mismatch")]
    Checksum,

    #[error("invalid recovery id {0}")]
    RecoveryId(u8),

    #[error("signature error: {0}")]
    Signature(String),
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

fn strip_0x(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

fn decode_fixed<const N: usize>(input: &str) -> Result<[u8; N], EthError> {
    let body = strip_0x(input);
    if body.len() != N * 2 {
        return Err(EthError::Length {
            expected: N,
            actual: body.len() / 2,
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(body, &mut out).map_err(|e| EthError::Hex(e.to_string()))?;
    Ok(out)
}

/// Hash signed by `personal_sign`:
/// `keccak256("\x19Ethereum Signed Message:\n" ‖ len(message) ‖ message)`.
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// `web3.utils.asciiToHex`: the bytes of `text`, hex-encoded with `0x`.
pub fn ascii_to_hex(text: &str) -> String {
    format!("0x{}", hex::encode(text.as_bytes()))
}

/// 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Last 20 bytes of keccak-256 over the uncompressed public key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let affine: &AffinePoint = key.as_ref();
        let point = affine.to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&hash[12..]);
        Address(out)
    }

    /// Parses a `0x`-prefixed or bare 40-digit hex address.
    ///
    /// All-lowercase and all-uppercase inputs are accepted as is; mixed case
    /// must carry a valid EIP-55 checksum.
    pub fn parse(input: &str) -> Result<Self, EthError> {
        let address = Address(decode_fixed::<20>(input)?);
        let body = strip_0x(input);
        let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum()[2..] != *body {
            return Err(EthError::Checksum);
        }
        Ok(address)
    }

    /// EIP-55 mixed-case checksum encoding.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, ch) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl FromStr for Address {
    type Err = EthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Address::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// 65-byte `r ‖ s ‖ v` signature, `v` stored as 27 or 28.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EthSignature([u8; 65]);

impl EthSignature {
    /// Accepts `v` as 0/1 or 27/28 and stores it as 27/28.
    pub fn from_bytes(mut bytes: [u8; 65]) -> Result<Self, EthError> {
        bytes[64] = match bytes[64] {
            0 | 1 => bytes[64] + 27,
            27 | 28 => bytes[64],
            other => return Err(EthError::RecoveryId(other)),
        };
        Ok(EthSignature(bytes))
    }

    pub fn parse(input: &str) -> Result<Self, EthError> {
        Self::from_bytes(decode_fixed::<65>(input)?)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    fn parts(&self) -> Result<(Signature, RecoveryId), EthError> {
        let signature =
            Signature::from_slice(&self.0[..64]).map_err(|e| EthError::Signature(e.to_string()))?;
        let recovery_id =
            RecoveryId::from_byte(self.0[64] - 27).ok_or(EthError::RecoveryId(self.0[64]))?;
        Ok((signature, recovery_id))
    }
}

impl fmt::Display for EthSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EthSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthSignature({})", self.to_hex())
    }
}

impl serde::Serialize for EthSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for EthSignature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        EthSignature::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Signs a 32-byte hash, producing a recoverable signature.
pub fn sign_hash(key: &SigningKey, hash: &[u8; 32]) -> Result<EthSignature, EthError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(hash)
        .map_err(|e| EthError::Signature(e.to_string()))?;

    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&signature.to_bytes());
    bytes[64] = recovery_id.to_byte() + 27;
    Ok(EthSignature(bytes))
}

/// Recovers the address that produced `signature` over `hash`.
pub fn recover_address(hash: &[u8; 32], signature: &EthSignature) -> Result<Address, EthError> {
    let (signature, recovery_id) = signature.parts()?;
    let key = VerifyingKey::recover_from_prehash(hash, &signature, recovery_id)
        .map_err(|e| EthError::Signature(e.to_string()))?;
    Ok(Address::from_verifying_key(&key))
}

/// Parses a hex private key (with or without `0x`).
pub fn signing_key_from_hex(input: &str) -> Result<SigningKey, EthError> {
    let bytes = decode_fixed::<32>(input)?;
    SigningKey::from_slice(&bytes).map_err(|e| EthError::Signature(e.to_string()))
}
