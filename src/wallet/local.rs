use super::eth::{self, Address, EthSignature};
use super::{ProviderError, TransactionRequest, TxHash, WalletProvider};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use std::sync::Mutex;

/// In-process signer holding one secp256k1 key.
///
/// For local development and tests: it signs messages itself and records
/// transactions instead of broadcasting them, acknowledging each with a
/// deterministic keccak-based hash.
pub struct LocalKeyProvider {
    key: SigningKey,
    address: Address,
    sent: Mutex<Vec<TransactionRequest>>,
}

impl LocalKeyProvider {
    pub fn new(key: SigningKey) -> Self {
        let address = Address::from_verifying_key(key.verifying_key());
        LocalKeyProvider {
            key,
            address,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Builds a provider from a hex private key.
    pub fn from_hex(private_key: &str) -> Result<Self, ProviderError> {
        Ok(Self::new(eth::signing_key_from_hex(private_key)?))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Transactions accepted so far, oldest first.
    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    fn check_account(&self, account: &Address) -> Result<(), ProviderError> {
        if *account != self.address {
            return Err(ProviderError::Rpc {
                code: 4100,
                message: format!("account {} is not managed by this signer", account),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WalletProvider for LocalKeyProvider {
    fn name(&self) -> &str {
        "local-key"
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(vec![self.address])
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<TxHash, ProviderError> {
        self.check_account(&tx.from)?;

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| ProviderError::Signer("transaction log poisoned".to_string()))?;
        let nonce = sent.len() as u64;

        let mut preimage = Vec::with_capacity(48 + tx.data.len());
        preimage.extend_from_slice(tx.from.as_bytes());
        preimage.extend_from_slice(tx.to.as_bytes());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(tx.data.as_bytes());
        let hash = TxHash(eth::keccak256(&preimage));

        sent.push(tx.clone());
        tracing::debug!(%hash, nonce, "transaction recorded by local signer");
        Ok(hash)
    }

    async fn personal_sign(
        &self,
        message: &[u8],
        account: &Address,
    ) -> Result<EthSignature, ProviderError> {
        self.check_account(account)?;
        Ok(eth::sign_hash(&self.key, &eth::eip191_hash(message))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::TRANSACTION_GAS;

    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[tokio::test]
    async fn test_sign_then_recover() {
        let provider = LocalKeyProvider::from_hex(DEV_KEY).unwrap();
        let account = provider.request_accounts().await.unwrap()[0];
        let message = [7u8; 32];

        let signature = provider.personal_sign(&message, &account).await.unwrap();
        let signer = provider.recover_signer(&message, &signature).await.unwrap();
        assert_eq!(signer, account);
    }

    #[tokio::test]
    async fn test_foreign_account_is_refused() {
        let provider = LocalKeyProvider::from_hex(DEV_KEY).unwrap();
        let stranger = Address::from_bytes([9; 20]);
        let err = provider.personal_sign(b"x", &stranger).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rpc { code: 4100, .. }));
    }

    #[tokio::test]
    async fn test_transactions_are_recorded_with_distinct_hashes() {
        let provider = LocalKeyProvider::from_hex(DEV_KEY).unwrap();
        let tx = TransactionRequest {
            from: provider.address(),
            to: provider.address(),
            value: 0,
            data: eth::ascii_to_hex("abc"),
            gas: TRANSACTION_GAS,
        };
        let first = provider.send_transaction(&tx).await.unwrap();
        let second = provider.send_transaction(&tx).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(provider.sent_transactions(), vec![tx.clone(), tx]);
    }

    #[test]
    fn test_bad_key_is_rejected() {
        assert!(LocalKeyProvider::from_hex("00").is_err());
        assert!(LocalKeyProvider::from_hex(&"0".repeat(64)).is_err());
    }
}
