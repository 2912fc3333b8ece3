//! Signing key for buys and sells.
//!
//! Secrets come either as the CLI keygen JSON byte array or as a base58 string, the
//! format browser wallets export.

use std::fs;
use std::path::Path;

use solana_sdk::{
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Failed to read keypair file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Secret is neither a JSON byte array nor base58")]
    UnknownFormat,
    #[error("Invalid keypair bytes: {0}")]
    InvalidKeypair(String),
    #[error("Failed to sign transaction: {0}")]
    SigningError(String),
}

pub struct WalletManager {
    keypair: Keypair,
}

// Keypair is not Clone; tests clone wallets into executors.
#[cfg(test)]
impl Clone for WalletManager {
    fn clone(&self) -> Self {
        Self { keypair: self.keypair.insecure_clone() }
    }
}

impl WalletManager {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| WalletError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_secret(&contents)
    }

    /// `[12,34,...]` or a base58 secret key
    pub fn from_secret(secret: &str) -> Result<Self, WalletError> {
        let secret = secret.trim();
        let bytes = if secret.starts_with('[') {
            serde_json::from_str::<Vec<u8>>(secret).map_err(|_| WalletError::UnknownFormat)?
        } else {
            bs58::decode(secret).into_vec().map_err(|_| WalletError::UnknownFormat)?
        };

        let keypair = Keypair::try_from(bytes.as_slice()).map_err(|e| WalletError::InvalidKeypair(e.to_string()))?;
        Ok(Self { keypair })
    }

    pub fn new_random() -> Self {
        Self { keypair: Keypair::new() }
    }

    pub fn public_key(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Sign a prepared message. The wallet must be the only required signer.
    pub fn sign_message(&self, message: VersionedMessage) -> Result<VersionedTransaction, WalletError> {
        VersionedTransaction::try_new(message, &[&self.keypair]).map_err(|e| WalletError::SigningError(e.to_string()))
    }
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager").field("pubkey", &self.pubkey()).finish_non_exhaustive()
    }
}
