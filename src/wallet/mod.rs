//! Wallet provider seam.
//!
//! A provider owns the user's accounts and keys. This crate only asks it
//! for accounts, to submit a transaction, or to sign a message.

pub mod eth;
mod local;
#[cfg(feature = "rpc")]
mod rpc;

pub use eth::{Address, EthError, EthSignature};
pub use local::LocalKeyProvider;
#[cfg(feature = "rpc")]
pub use rpc::JsonRpcProvider;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Gas limit attached to every transaction.
pub const TRANSACTION_GAS: u64 = 21_000;

/// JSON-RPC error code a provider returns when the user declines.
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("User rejected the request.")]
    UserRejected,

    #[error("{message}")]
    Rpc { code: i64, message: String },

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Signer(String),
}

impl From<EthError> for ProviderError {
    fn from(err: EthError) -> Self {
        ProviderError::Signer(err.to_string())
    }
}

fn as_quantity<S: serde::Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:#x}", value))
}

/// Parameters of `eth_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    #[serde(serialize_with = "as_quantity")]
    pub value: u64,
    /// `0x`-prefixed hex payload
    pub data: String,
    #[serde(serialize_with = "as_quantity")]
    pub gas: u64,
}

/// Transaction hash a provider returns once it accepted a transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn parse(input: &str) -> Result<Self, ProviderError> {
        let body = input.strip_prefix("0x").unwrap_or(input);
        let mut out = [0u8; 32];
        hex::decode_to_slice(body, &mut out)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad transaction hash: {}", e)))?;
        Ok(TxHash(out))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl Serialize for TxHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub type DynWalletProvider = Arc<dyn WalletProvider>;

/// Capabilities a wallet provider exposes.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Asks the user for account access. An empty list means no account is
    /// connected.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<TxHash, ProviderError>;

    /// Signs `message` with the EIP-191 personal message prefix.
    async fn personal_sign(
        &self,
        message: &[u8],
        account: &Address,
    ) -> Result<EthSignature, ProviderError>;

    /// Recovers the account that signed `message`.
    async fn recover_signer(
        &self,
        message: &[u8],
        signature: &EthSignature,
    ) -> Result<Address, ProviderError> {
        Ok(eth::recover_address(&eth::eip191_hash(message), signature)?)
    }
}

pub trait IntoDynProvider {
    fn into_dyn(self) -> DynWalletProvider
    where
        Self: Sized + WalletProvider + 'static,
    {
        Arc::new(self)
    }
}

impl<T> IntoDynProvider for T where T: WalletProvider + 'static {}
