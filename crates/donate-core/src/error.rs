//! error types for the donation client
//!
//! wallet extensions only report failures as free-form messages, so the
//! mapping from message text to failure kind lives here in one table.

use thiserror::Error;

/// how a wallet failure should be treated by the retry layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// the human rejected the wallet prompt
    UserCancelled,
    /// the wallet considers the request malformed
    InvalidParameters,
    /// no response within the attempt deadline
    Timeout,
    /// anything else: extension busy, rpc hiccup, ...
    Transient,
}

impl FailureKind {
    /// terminal failures are never retried
    pub fn is_terminal(self) -> bool {
        matches!(self, FailureKind::UserCancelled | FailureKind::InvalidParameters)
    }
}

/// message substrings (lowercase) recognized at the wallet boundary.
/// first match wins; unmatched messages are transient.
pub const FAILURE_PATTERNS: &[(&str, FailureKind)] = &[
    ("user rejected", FailureKind::UserCancelled),
    ("rejected by user", FailureKind::UserCancelled),
    ("user denied", FailureKind::UserCancelled),
    ("user cancelled", FailureKind::UserCancelled),
    ("user canceled", FailureKind::UserCancelled),
    ("request rejected", FailureKind::UserCancelled),
    ("invalid parameters", FailureKind::InvalidParameters),
    ("invalid params", FailureKind::InvalidParameters),
    ("invalid transaction", FailureKind::InvalidParameters),
    ("malformed", FailureKind::InvalidParameters),
    ("timed out", FailureKind::Timeout),
    ("timeout", FailureKind::Timeout),
];

/// classify a raw wallet message
pub fn classify(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    FAILURE_PATTERNS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, kind)| *kind)
        .unwrap_or(FailureKind::Transient)
}

/// raw rejection reported by a wallet capability
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct WalletFailure {
    pub message: String,
}

impl WalletFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        classify(&self.message)
    }
}

impl From<&str> for WalletFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for WalletFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// outcome of a wallet operation after the retry layer gave up
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    /// surfaced verbatim, never retried
    #[error("{0}")]
    UserCancelled(String),

    /// surfaced verbatim, never retried
    #[error("{0}")]
    InvalidParameters(String),

    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },
}

impl WalletError {
    /// true when trying again later could succeed
    pub fn is_retryable_later(&self) -> bool {
        matches!(self, WalletError::Exhausted { .. })
    }
}

#[derive(Debug, Error)]
pub enum DonateError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("wallet does not support {0}")]
    CapabilityAbsent(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// the public transfer landed but the private record did not
    #[error("transfer {transfer_id} submitted but donation record failed: {source}")]
    PartialDonation {
        transfer_id: String,
        #[source]
        source: WalletError,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DonateError>;

impl From<toml::de::Error> for DonateError {
    fn from(e: toml::de::Error) -> Self {
        DonateError::Config(e.to_string())
    }
}

impl From<sled::Error> for DonateError {
    fn from(e: sled::Error) -> Self {
        DonateError::Cache(e.to_string())
    }
}
