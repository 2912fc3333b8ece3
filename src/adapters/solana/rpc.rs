use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_client::{GetConfirmedSignaturesForAddress2Config, RpcClient};
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::{
    option_serializer::OptionSerializer, EncodedConfirmedTransactionWithStatusMeta,
    EncodedTransaction, TransactionConfirmationStatus, UiMessage, UiTransactionEncoding,
};
use spl_associated_token_account::get_associated_token_address;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::ports::chain::{
    BlockhashWindow, ChainError, ChainPort, ConfirmationLevel, ParsedTransaction,
    TokenBalanceEntry, WalletTokenBalance,
};

/// Node-side resubmission count for skip-preflight sends
pub const SEND_MAX_RETRIES: usize = 5;

/// Wrapper around Solana RPC client with async-compatible methods
#[derive(Clone)]
pub struct SolanaClient {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    confirm_poll_interval: Duration,
}

impl SolanaClient {
    /// Create a new Solana RPC client at `confirmed` commitment
    pub fn new(rpc_url: String) -> Self {
        Self::with_commitment(rpc_url, CommitmentConfig::confirmed())
    }

    pub fn with_commitment(rpc_url: String, commitment: CommitmentConfig) -> Self {
        let client = Arc::new(RpcClient::new_with_commitment(rpc_url, commitment));
        Self {
            client,
            commitment,
            confirm_poll_interval: Duration::from_millis(500),
        }
    }

    /// Run a blocking RPC call on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T, ChainError>
    where
        T: Send + 'static,
        F: FnOnce(&RpcClient) -> Result<T, ChainError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| ChainError::RpcError(format!("Task join error: {}", e)))?
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        let commitment = self.commitment;
        self.blocking(move |c| {
            c.get_block_height_with_commitment(commitment)
                .map_err(|e| ChainError::RpcError(e.to_string()))
        })
        .await
    }
}

fn parse_pubkey(address: &str) -> Result<Pubkey, ChainError> {
    Pubkey::from_str(address).map_err(|e| ChainError::InvalidPublicKey(format!("{}: {}", address, e)))
}

fn confirmation_level(status: &solana_transaction_status::TransactionStatus) -> ConfirmationLevel {
    match &status.confirmation_status {
        Some(TransactionConfirmationStatus::Finalized) => ConfirmationLevel::Finalized,
        Some(TransactionConfirmationStatus::Confirmed) => ConfirmationLevel::Confirmed,
        Some(TransactionConfirmationStatus::Processed) => ConfirmationLevel::Processed,
        // Older nodes omit the field; no confirmation count means rooted
        None if status.confirmations.is_none() => ConfirmationLevel::Finalized,
        None => ConfirmationLevel::Processed,
    }
}

fn option_value<T: Clone>(value: &OptionSerializer<T>) -> Option<T> {
    match value {
        OptionSerializer::Some(v) => Some(v.clone()),
        _ => None,
    }
}

/// Reduce an RPC transaction to signer, post token balances and execution error
pub fn parse_encoded_transaction(
    signature: &str,
    tx: &EncodedConfirmedTransactionWithStatusMeta,
) -> ParsedTransaction {
    let signer = match &tx.transaction.transaction {
        EncodedTransaction::Json(ui_tx) => match &ui_tx.message {
            UiMessage::Parsed(message) => message.account_keys.first().map(|k| k.pubkey.clone()),
            UiMessage::Raw(message) => message.account_keys.first().cloned(),
        },
        other => other
            .decode()
            .and_then(|decoded| decoded.message.static_account_keys().first().map(|k| k.to_string())),
    };

    let (post_token_balances, error) = match &tx.transaction.meta {
        Some(meta) => {
            let balances = option_value(&meta.post_token_balances)
                .unwrap_or_default()
                .into_iter()
                .map(|b| TokenBalanceEntry {
                    owner: option_value(&b.owner),
                    mint: b.mint.clone(),
                    ui_amount: b.ui_token_amount.ui_amount,
                })
                .collect();
            (balances, meta.err.as_ref().map(|e| format!("{:?}", e)))
        }
        None => (Vec::new(), Some("transaction meta unavailable".to_string())),
    };

    ParsedTransaction {
        signature: signature.to_string(),
        signer,
        post_token_balances,
        error,
    }
}

#[async_trait]
impl ChainPort for SolanaClient {
    async fn latest_blockhash(&self) -> Result<BlockhashWindow, ChainError> {
        let commitment = self.commitment;
        let (blockhash, last_valid_block_height) = self
            .blocking(move |c| {
                c.get_latest_blockhash_with_commitment(commitment)
                    .map_err(|e| ChainError::RpcError(e.to_string()))
            })
            .await?;
        Ok(BlockhashWindow { blockhash, last_valid_block_height })
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, ChainError> {
        let tx = transaction.clone();
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(SEND_MAX_RETRIES),
            ..Default::default()
        };
        self.blocking(move |c| {
            c.send_transaction_with_config(&tx, config)
                .map_err(|e| ChainError::TransactionError(e.to_string()))
        })
        .await
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        window: &BlockhashWindow,
    ) -> Result<(), ChainError> {
        let sig = *signature;
        let commitment = self.commitment;
        loop {
            let status = self
                .blocking(move |c| {
                    c.get_signature_statuses(&[sig])
                        .map(|r| r.value.into_iter().next().flatten())
                        .map_err(|e| ChainError::RpcError(e.to_string()))
                })
                .await?;

            if let Some(status) = status {
                if let Some(err) = &status.err {
                    return Err(ChainError::TransactionError(format!("{:?}", err)));
                }
                if status.satisfies_commitment(commitment) {
                    return Ok(());
                }
            }

            let height = self.block_height().await?;
            if height > window.last_valid_block_height {
                tracing::debug!(
                    "Blockhash expired for {} at height {} (valid until {})",
                    sig, height, window.last_valid_block_height
                );
                return Err(ChainError::ConfirmationTimeout);
            }
            tokio::time::sleep(self.confirm_poll_interval).await;
        }
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<ConfirmationLevel>, ChainError> {
        let sig = *signature;
        let status = self
            .blocking(move |c| {
                c.get_signature_statuses_with_history(&[sig])
                    .map(|r| r.value.into_iter().next().flatten())
                    .map_err(|e| ChainError::RpcError(e.to_string()))
            })
            .await?;

        match status {
            Some(status) => {
                if let Some(err) = &status.err {
                    return Err(ChainError::TransactionError(format!("{:?}", err)));
                }
                Ok(Some(confirmation_level(&status)))
            }
            None => Ok(None),
        }
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError> {
        let address = *address;
        let commitment = self.commitment;
        self.blocking(move |c| {
            c.get_account_with_commitment(&address, commitment)
                .map(|r| r.value.is_some())
                .map_err(|e| ChainError::RpcError(e.to_string()))
        })
        .await
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<WalletTokenBalance>, ChainError> {
        let ata = get_associated_token_address(owner, mint);
        if !self.account_exists(&ata).await? {
            return Ok(None);
        }

        let balance = self
            .blocking(move |c| {
                c.get_token_account_balance(&ata)
                    .map_err(|e| ChainError::RpcError(e.to_string()))
            })
            .await?;

        let amount = balance
            .amount
            .parse::<u64>()
            .map_err(|e| ChainError::RpcError(format!("Parse error: {}", e)))?;
        Ok(Some(WalletTokenBalance {
            amount,
            ui_amount: balance.ui_amount.unwrap_or(0.0),
            decimals: balance.decimals,
        }))
    }

    async fn sol_balance(&self, owner: &Pubkey) -> Result<u64, ChainError> {
        let owner = *owner;
        self.blocking(move |c| c.get_balance(&owner).map_err(|e| ChainError::RpcError(e.to_string())))
            .await
    }

    async fn parsed_transaction(&self, signature: &str) -> Result<ParsedTransaction, ChainError> {
        let sig = Signature::from_str(signature)
            .map_err(|e| ChainError::InvalidSignature(e.to_string()))?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        let lookup = signature.to_string();
        let tx = self
            .blocking(move |c| {
                c.get_transaction_with_config(&sig, config)
                    .map_err(|e| transaction_lookup_error(&lookup, e))
            })
            .await?;
        Ok(parse_encoded_transaction(signature, &tx))
    }

    async fn latest_signature_for(&self, address: &str) -> Result<Option<String>, ChainError> {
        let pubkey = parse_pubkey(address)?;
        let commitment = self.commitment;
        let signatures = self
            .blocking(move |c| {
                c.get_signatures_for_address_with_config(
                    &pubkey,
                    GetConfirmedSignaturesForAddress2Config {
                        limit: Some(1),
                        commitment: Some(commitment),
                        ..Default::default()
                    },
                )
                .map_err(|e| ChainError::RpcError(e.to_string()))
            })
            .await?;
        Ok(signatures.into_iter().next().map(|s| s.signature))
    }
}

/// `getTransaction` answers `null` for unknown signatures, which surfaces as a decode error
fn transaction_lookup_error(signature: &str, error: ClientError) -> ChainError {
    match error.kind() {
        ClientErrorKind::SerdeJson(e) if e.to_string().starts_with("invalid type: null") => {
            ChainError::NotFound(signature.to_string())
        }
        _ => ChainError::RpcError(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(json: serde_json::Value) -> EncodedConfirmedTransactionWithStatusMeta {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = SolanaClient::new("https://api.devnet.solana.com".to_string());
        assert_eq!(client.commitment, CommitmentConfig::confirmed());
    }

    #[test]
    fn test_error_display() {
        let err = ChainError::RpcError("test".to_string());
        assert!(err.to_string().contains("RPC request failed"));

        let err = ChainError::ConfirmationTimeout;
        assert!(err.to_string().contains("Timeout"));
    }

    #[test]
    fn test_unknown_transaction_is_not_found() {
        let null_result = serde_json::from_value::<EncodedConfirmedTransactionWithStatusMeta>(serde_json::Value::Null)
            .unwrap_err();
        let err = transaction_lookup_error("sig1", ClientError::from(null_result));
        assert!(matches!(err, ChainError::NotFound(sig) if sig == "sig1"));

        let err = transaction_lookup_error("sig1", ClientError::from(ClientErrorKind::Custom("node behind".into())));
        assert!(matches!(err, ChainError::RpcError(msg) if msg.contains("node behind")));
    }

    #[test]
    fn test_parse_json_parsed_transaction() {
        let tx = encoded(serde_json::json!({
            "slot": 1,
            "blockTime": null,
            "transaction": {
                "signatures": ["sig"],
                "message": {
                    "accountKeys": [
                        {"pubkey": "Creator1111111111111111111111111111111111111", "writable": true, "signer": true, "source": "transaction"}
                    ],
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": []
                }
            },
            "meta": {
                "err": null,
                "status": {"Ok": null},
                "fee": 5000,
                "preBalances": [],
                "postBalances": [],
                "postTokenBalances": [{
                    "accountIndex": 4,
                    "mint": "Mint111111111111111111111111111111111111111",
                    "owner": "5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1",
                    "uiTokenAmount": {"uiAmount": 10.0, "decimals": 6, "amount": "10000000", "uiAmountString": "10"}
                }]
            }
        }));

        let parsed = parse_encoded_transaction("sig", &tx);
        assert_eq!(parsed.signer.as_deref(), Some("Creator1111111111111111111111111111111111111"));
        assert!(parsed.error.is_none());
        assert_eq!(parsed.post_token_balances.len(), 1);
        assert_eq!(
            parsed.post_token_balances[0].owner.as_deref(),
            Some("5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1")
        );
    }

    #[test]
    fn test_parse_failed_transaction() {
        let tx = encoded(serde_json::json!({
            "slot": 1,
            "blockTime": null,
            "transaction": {
                "signatures": ["sig"],
                "message": {
                    "accountKeys": ["Creator1111111111111111111111111111111111111"],
                    "header": {"numRequiredSignatures": 1, "numReadonlySignedAccounts": 0, "numReadonlyUnsignedAccounts": 0},
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": []
                }
            },
            "meta": {
                "err": {"InstructionError": [0, "InvalidAccountData"]},
                "status": {"Err": {"InstructionError": [0, "InvalidAccountData"]}},
                "fee": 5000,
                "preBalances": [],
                "postBalances": []
            }
        }));

        let parsed = parse_encoded_transaction("sig", &tx);
        assert!(parsed.error.is_some());
        assert!(parsed.post_token_balances.is_empty());
        assert_eq!(parsed.signer.as_deref(), Some("Creator1111111111111111111111111111111111111"));
    }
}
