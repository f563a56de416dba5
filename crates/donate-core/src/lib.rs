//! donate-core: client core for private donations on aleo
//!
//! a donation is a public `transfer_public` followed by a private
//! `send_donation` record. there is no indexer: history is rebuilt by asking
//! the wallet for its records, decrypting them and classifying what comes
//! back.
//!
//! ## pipeline
//!
//! ```text
//! WalletAdapter ──requestRecords──▶ RecordFetcher ──decrypt──▶ plaintexts
//!      ▲           (RetryRunner)                 (RetryRunner)     │
//!      │                                                       parse_record
//!  set_subject / refresh / poll / notify_optimistic                │
//!      │                                                           ▼
//! HistoryReconciler ◀────────── partition (owner, direction) ◀── records
//! ```
//!
//! ## usage
//!
//! ```rust,ignore
//! let config = ClientConfig::default();
//! let history = HistoryReconciler::new(wallet.clone(), config.history());
//! history.set_subject(wallet.public_key()).await;
//! let state = history.snapshot().await;
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod history;
pub mod parser;
pub mod records;
pub mod retry;
pub mod transaction;
pub mod wallet;

pub use cache::{CachedProfile, DonatePreferences, KvStore, LocalCache, MemoryStore, SledStore};
pub use codec::{decode_field, encode_field};
pub use config::ClientConfig;
pub use error::{DonateError, FailureKind, Result, WalletError, WalletFailure};
pub use history::{HistoryConfig, HistoryReconciler, HistoryState, HistoryView, SortKey};
pub use parser::{parse_record, Counterparty, Direction, DonationRecord};
pub use records::{RecordFetcher, RecordPlaintext};
pub use retry::{RetryPolicy, RetryRunner};
pub use transaction::{
    describe_submission_error, format_credits, parse_credits, Donation, DonationReceipt,
    DonationSubmitter, ProfileAction, TransactionRequest, Transition,
};
pub use wallet::{
    RecordDecryptor, RecordHandle, RecordProvider, SnapshotWallet, TransactionSubmitter,
    WalletAdapter, WalletSnapshot,
};
