//! wallet capability seam
//!
//! browser wallets expose overlapping but different method sets. each
//! capability is its own trait and an adapter hands out the ones it has;
//! callers check presence before use and degrade to empty results.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DonateError, Result, WalletFailure};
use crate::transaction::TransactionRequest;

/// opaque record handle as returned by `requestRecords`
pub type RecordHandle = Value;

/// lists the records a wallet holds for a program
#[async_trait]
pub trait RecordProvider: Send + Sync {
    async fn request_records(
        &self,
        program_id: &str,
    ) -> std::result::Result<Vec<RecordHandle>, WalletFailure>;
}

/// decrypts a record ciphertext into its plaintext body
#[async_trait]
pub trait RecordDecryptor: Send + Sync {
    async fn decrypt(&self, ciphertext: &str) -> std::result::Result<String, WalletFailure>;
}

/// asks the wallet to sign and broadcast a transaction, returns its id
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    async fn request_transaction(
        &self,
        request: &TransactionRequest,
    ) -> std::result::Result<String, WalletFailure>;
}

/// a connected wallet and whatever it can do
pub trait WalletAdapter: Send + Sync {
    /// connected account address, if any
    fn public_key(&self) -> Option<String>;

    fn records(&self) -> Option<&dyn RecordProvider> {
        None
    }

    fn decryptor(&self) -> Option<&dyn RecordDecryptor> {
        None
    }

    fn submitter(&self) -> Option<&dyn TransactionSubmitter> {
        None
    }
}

/// exported wallet state for offline inspection
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WalletSnapshot {
    /// account the records belong to
    #[serde(default)]
    pub address: Option<String>,
    /// raw handles, in wallet order
    #[serde(default)]
    pub records: Vec<RecordHandle>,
    /// ciphertext -> plaintext
    #[serde(default)]
    pub plaintexts: HashMap<String, String>,
}

/// read-only wallet backed by a [`WalletSnapshot`]
///
/// it can list and decrypt what was exported but cannot sign.
#[derive(Clone, Debug, Default)]
pub struct SnapshotWallet {
    snapshot: WalletSnapshot,
}

impl SnapshotWallet {
    pub fn new(snapshot: WalletSnapshot) -> Self {
        Self { snapshot }
    }

    /// load a snapshot exported as json
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&raw)
            .map_err(|e| DonateError::InvalidInput(format!("wallet snapshot: {}", e)))?;
        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> &WalletSnapshot {
        &self.snapshot
    }
}

#[async_trait]
impl RecordProvider for SnapshotWallet {
    async fn request_records(
        &self,
        _program_id: &str,
    ) -> std::result::Result<Vec<RecordHandle>, WalletFailure> {
        Ok(self.snapshot.records.clone())
    }
}

#[async_trait]
impl RecordDecryptor for SnapshotWallet {
    async fn decrypt(&self, ciphertext: &str) -> std::result::Result<String, WalletFailure> {
        self.snapshot
            .plaintexts
            .get(ciphertext)
            .cloned()
            // terminal: a snapshot never gains records
            .ok_or_else(|| WalletFailure::new("invalid params: ciphertext not in snapshot"))
    }
}

impl WalletAdapter for SnapshotWallet {
    fn public_key(&self) -> Option<String> {
        self.snapshot.address.clone()
    }

    fn records(&self) -> Option<&dyn RecordProvider> {
        Some(self)
    }

    fn decryptor(&self) -> Option<&dyn RecordDecryptor> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_wallet_capabilities() {
        let snapshot: WalletSnapshot = serde_json::from_value(json!({
            "address": "aleo1abc",
            "records": ["record1xyz"],
            "plaintexts": { "record1xyz": "{ owner: aleo1abc.private }" }
        }))
        .unwrap();
        let wallet = SnapshotWallet::new(snapshot);

        assert_eq!(wallet.public_key().as_deref(), Some("aleo1abc"));
        assert!(wallet.submitter().is_none());

        let records = wallet.records().unwrap().request_records("any.aleo").await.unwrap();
        assert_eq!(records.len(), 1);

        let decryptor = wallet.decryptor().unwrap();
        assert!(decryptor.decrypt("record1xyz").await.is_ok());
        assert!(decryptor.decrypt("record1other").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_plaintext_is_not_retried() {
        let wallet = SnapshotWallet::new(WalletSnapshot::default());
        let failure = wallet.decrypt("record1gone").await.unwrap_err();
        assert!(failure.kind().is_terminal());

        let retries = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = retries.clone();
        let runner = crate::retry::RetryRunner::default().with_on_retry(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let err = runner
            .run("decrypt", || wallet.decrypt("record1gone"))
            .await
            .unwrap_err();

        assert!(matches!(err, crate::error::WalletError::InvalidParameters(_)));
        assert_eq!(retries.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_snapshot_defaults_when_fields_missing() {
        let snapshot: WalletSnapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.address.is_none());
        assert!(snapshot.records.is_empty());
    }
}
