//! private record retrieval
//!
//! asks the wallet for every record it holds under a program, picks out the
//! ciphertexts and decrypts them one by one. handles that carry no
//! ciphertext are wallet metadata and are skipped; a record that fails to
//! decrypt is logged and skipped without aborting the batch.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::WalletError;
use crate::retry::RetryRunner;
use crate::wallet::{RecordHandle, WalletAdapter};

/// prefix of an encrypted record
pub const CIPHERTEXT_PREFIX: &str = "record1";

/// object fields that may hold the ciphertext, in priority order
pub const CIPHERTEXT_FIELDS: &[&str] = &["ciphertext", "recordCiphertext", "record_ciphertext", "record"];

/// decrypted record body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPlaintext {
    /// wallet-assigned id, when the handle carried one
    pub id: Option<String>,
    pub plaintext: String,
}

/// pull a recognized ciphertext out of a handle
pub fn extract_ciphertext(handle: &RecordHandle) -> Option<&str> {
    if let Some(s) = handle.as_str() {
        return s.starts_with(CIPHERTEXT_PREFIX).then_some(s);
    }

    let object = handle.as_object()?;
    CIPHERTEXT_FIELDS
        .iter()
        .filter_map(|field| object.get(*field).and_then(|v| v.as_str()))
        .find(|s| s.starts_with(CIPHERTEXT_PREFIX))
}

/// string `id` of a handle, if present
pub fn extract_id(handle: &RecordHandle) -> Option<String> {
    handle
        .as_object()
        .and_then(|o| o.get("id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// fetches and decrypts records through a [`RetryRunner`]
pub struct RecordFetcher<'a> {
    wallet: &'a dyn WalletAdapter,
    runner: RetryRunner,
}

impl<'a> RecordFetcher<'a> {
    pub fn new(wallet: &'a dyn WalletAdapter, runner: RetryRunner) -> Self {
        Self { wallet, runner }
    }

    /// decrypted plaintexts for `program_id`, in wallet order
    ///
    /// a wallet without record listing or decryption yields an empty list.
    /// only a failed `requestRecords` is an error.
    pub async fn fetch_records(&self, program_id: &str) -> Result<Vec<RecordPlaintext>, WalletError> {
        let Some(provider) = self.wallet.records() else {
            debug!("wallet cannot list records");
            return Ok(Vec::new());
        };
        let Some(decryptor) = self.wallet.decryptor() else {
            debug!("wallet cannot decrypt records");
            return Ok(Vec::new());
        };

        let handles = self
            .runner
            .run("requestRecords", || provider.request_records(program_id))
            .await?;

        debug!("wallet returned {} record handles for {}", handles.len(), program_id);

        let mut out = Vec::with_capacity(handles.len());
        for (index, handle) in handles.iter().enumerate() {
            let Some(ciphertext) = extract_ciphertext(handle) else {
                debug!("handle {} carries no ciphertext, skipping", index);
                continue;
            };

            match self.runner.run("decrypt", || decryptor.decrypt(ciphertext)).await {
                Ok(plaintext) => out.push(RecordPlaintext {
                    id: extract_id(handle),
                    plaintext,
                }),
                Err(e) => warn!("failed to decrypt record {}: {}", index, e),
            }
        }

        Ok(out)
    }
}
