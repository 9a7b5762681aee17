//! Wallet bridge: turns a digest into a transaction or a signature through
//! whichever wallet provider is configured.

use crate::digest::DigestHex;
use crate::wallet::eth::{self, Address, EthSignature};
use crate::wallet::{DynWalletProvider, ProviderError, TRANSACTION_GAS, TransactionRequest, TxHash};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;

/// What the bridge does with a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Record the digest as transaction data
    Transact,
    /// Sign the digest as a personal message
    #[default]
    Sign,
}

impl std::str::FromStr for BridgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transact" => Ok(BridgeMode::Transact),
            "sign" => Ok(BridgeMode::Sign),
            other => Err(format!("unknown wallet mode '{}' (expected transact or sign)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("Web3 not available. Please install a wallet provider.")]
    ProviderUnavailable,

    #[error("User denied account access.")]
    AccessDenied,

    #[error("No account connected. Please connect your wallet.")]
    NoAccount,

    #[error("Wallet connection failed: {0}")]
    Connection(#[source] ProviderError),

    #[error("Failed to store hash on blockchain: {0}")]
    Submission(#[source] ProviderError),

    #[error("Signature failed: {0}")]
    Signature(#[source] ProviderError),

    #[error("Another wallet request is still in progress.")]
    Busy,
}

/// Acknowledgment of a submitted transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactReceipt {
    pub digest: DigestHex,
    pub account: Address,
    pub transaction: TxHash,
    pub timestamp: OffsetDateTime,
}

/// A digest signed by the connected account.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedDigest {
    pub digest: DigestHex,
    pub signature: EthSignature,
    /// Recovered signer, or the connected account when recovery failed
    pub signer: Address,
    pub account: Address,
    pub timestamp: OffsetDateTime,
}

/// Holds the in-flight flag until dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, BridgeError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BridgeError::Busy)?;
        Ok(InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Connection state and the two digest sequences.
///
/// Only one sequence runs at a time; a second caller gets
/// [`BridgeError::Busy`] instead of a duplicate wallet prompt. Failures are
/// never retried.
pub struct WalletBridge {
    provider: Option<DynWalletProvider>,
    account: Mutex<Option<Address>>,
    in_flight: AtomicBool,
}

impl WalletBridge {
    /// `None` models an environment without any wallet.
    pub fn new(provider: Option<DynWalletProvider>) -> Self {
        WalletBridge {
            provider,
            account: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.name())
    }

    /// Account from the last successful connection, if any.
    pub fn account(&self) -> Option<Address> {
        self.account.lock().ok().and_then(|account| *account)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn set_account(&self, account: Option<Address>) {
        if let Ok(mut current) = self.account.lock() {
            *current = account;
        }
    }

    fn provider(&self) -> Result<&DynWalletProvider, BridgeError> {
        self.provider.as_ref().ok_or(BridgeError::ProviderUnavailable)
    }

    async fn request_account(&self, provider: &DynWalletProvider) -> Result<Address, BridgeError> {
        let accounts = match provider.request_accounts().await {
            Ok(accounts) => accounts,
            Err(ProviderError::UserRejected) => {
                tracing::warn!(provider = provider.name(), "account access denied");
                self.set_account(None);
                return Err(BridgeError::AccessDenied);
            }
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "account request failed");
                return Err(BridgeError::Connection(e));
            }
        };

        let account = accounts.first().copied();
        self.set_account(account);
        account.ok_or(BridgeError::NoAccount)
    }

    /// Requests account access and remembers the first account.
    pub async fn connect(&self) -> Result<Address, BridgeError> {
        let provider = self.provider()?;
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let account = self.request_account(provider).await?;
        tracing::info!(%account, provider = provider.name(), "wallet connected");
        Ok(account)
    }

    /// Records the digest in a zero-value transaction from the account to itself.
    pub async fn transact(&self, digest: &DigestHex) -> Result<TransactReceipt, BridgeError> {
        let provider = self.provider()?;
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let account = self.request_account(provider).await?;

        let tx = TransactionRequest {
            from: account,
            to: account,
            value: 0,
            data: eth::ascii_to_hex(digest.as_str()),
            gas: TRANSACTION_GAS,
        };
        let transaction = provider.send_transaction(&tx).await.map_err(|e| {
            tracing::warn!(error = %e, "transaction failed");
            BridgeError::Submission(e)
        })?;

        tracing::info!(%transaction, %account, %digest, "digest stored");
        Ok(TransactReceipt {
            digest: digest.clone(),
            account,
            transaction,
            timestamp: OffsetDateTime::now_utc(),
        })
    }

    /// Has the account sign the 32 digest bytes as a personal message, then
    /// recovers the signer from the signature.
    pub async fn sign(&self, digest: &DigestHex) -> Result<SignedDigest, BridgeError> {
        let provider = self.provider()?;
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let account = self.request_account(provider).await?;

        let message = digest.as_bytes32();
        let signature = provider
            .personal_sign(&message, &account)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "signature failed");
                BridgeError::Signature(e)
            })?;

        let signer = match provider.recover_signer(&message, &signature).await {
            Ok(signer) => signer,
            Err(e) => {
                tracing::warn!(error = %e, "signer recovery failed, showing connected account");
                account
            }
        };
        if signer != account {
            tracing::warn!(%signer, %account, "recovered signer differs from connected account");
        }

        tracing::info!(%signer, %digest, "digest signed");
        Ok(SignedDigest {
            digest: digest.clone(),
            signature,
            signer,
            account,
            timestamp: OffsetDateTime::now_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{IntoDynProvider, LocalKeyProvider};

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn local_bridge() -> (WalletBridge, std::sync::Arc<LocalKeyProvider>) {
        let provider = std::sync::Arc::new(LocalKeyProvider::from_hex(DEV_KEY).unwrap());
        let dyn_provider: DynWalletProvider = provider.clone();
        (WalletBridge::new(Some(dyn_provider)), provider)
    }

    #[tokio::test]
    async fn test_absent_provider() {
        let bridge = WalletBridge::new(None);
        let digest = DigestHex::compute(b"paper");
        assert_eq!(bridge.transact(&digest).await, Err(BridgeError::ProviderUnavailable));
        assert_eq!(bridge.sign(&digest).await, Err(BridgeError::ProviderUnavailable));
        assert_eq!(
            BridgeError::ProviderUnavailable.to_string(),
            "Web3 not available. Please install a wallet provider."
        );
    }

    #[tokio::test]
    async fn test_transact_sends_digest_as_ascii_hex() {
        let (bridge, provider) = local_bridge();
        let digest = DigestHex::compute(b"paper");
        let receipt = bridge.transact(&digest).await.unwrap();

        let sent = provider.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, receipt.account);
        assert_eq!(sent[0].to, receipt.account);
        assert_eq!(sent[0].value, 0);
        assert_eq!(sent[0].gas, 21_000);
        assert_eq!(sent[0].data, format!("0x{}", hex::encode(digest.as_str())));
        assert!(!bridge.is_busy());
    }

    #[tokio::test]
    async fn test_sign_recovers_connected_account() {
        let (bridge, provider) = local_bridge();
        let digest = DigestHex::compute(b"paper");
        let signed = bridge.sign(&digest).await.unwrap();
        assert_eq!(signed.signer, provider.address());
        assert_eq!(signed.account, provider.address());
        assert_eq!(bridge.account(), Some(provider.address()));
    }

    #[tokio::test]
    async fn test_guard_is_released_after_failure() {
        let bridge = WalletBridge::new(Some(
            LocalKeyProvider::from_hex(DEV_KEY).unwrap().into_dyn(),
        ));
        let flag = &bridge.in_flight;
        {
            let _held = InFlightGuard::acquire(flag).unwrap();
            let digest = DigestHex::compute(b"x");
            assert_eq!(bridge.sign(&digest).await, Err(BridgeError::Busy));
        }
        assert!(bridge.connect().await.is_ok());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Transact".parse::<BridgeMode>(), Ok(BridgeMode::Transact));
        assert_eq!("sign".parse::<BridgeMode>(), Ok(BridgeMode::Sign));
        assert!("mint".parse::<BridgeMode>().is_err());
        assert_eq!(BridgeMode::default(), BridgeMode::Sign);
    }
}
