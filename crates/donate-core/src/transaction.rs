//! donation and profile transactions
//!
//! a donation is two wallet requests in a fixed order:
//!
//! 1. `credits.aleo/transfer_public(recipient, amount)` moves the funds
//! 2. `<program>/send_donation(sender, recipient, amount, message, timestamp)`
//!    mints the private records both parties later read their history from
//!
//! input order and literal suffixes are the deployed contract's signature;
//! do not reorder.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codec::encode_field;
use crate::error::{DonateError, Result, WalletError};
use crate::parser::ADDRESS_PREFIX;
use crate::retry::RetryRunner;
use crate::wallet::WalletAdapter;

pub const CREDITS_PROGRAM: &str = "credits.aleo";
pub const TRANSFER_PUBLIC: &str = "transfer_public";
pub const SEND_DONATION: &str = "send_donation";
pub const CREATE_PROFILE: &str = "create_profile";
pub const UPDATE_PROFILE: &str = "update_profile";

/// microcredits per credit
pub const MICROCREDITS_PER_CREDIT: u64 = 1_000_000;

/// one program call inside a transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub program: String,
    pub function: String,
    pub inputs: Vec<String>,
}

/// request handed to the wallet for signing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub address: String,
    pub chain_id: String,
    pub transitions: Vec<Transition>,
    pub fee: u64,
    pub fee_private: bool,
}

/// fee settings shared by every request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeConfig {
    pub chain_id: String,
    pub fee_microcredits: u64,
    pub fee_private: bool,
}

impl FeeConfig {
    fn request(&self, address: &str, transition: Transition) -> TransactionRequest {
        TransactionRequest {
            address: address.to_string(),
            chain_id: self.chain_id.clone(),
            transitions: vec![transition],
            fee: self.fee_microcredits,
            fee_private: self.fee_private,
        }
    }
}

/// a donation before submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Donation {
    pub sender: String,
    pub recipient: String,
    pub amount_microcredits: u64,
    /// plain text, encoded on submission
    pub message: String,
    /// unix seconds
    pub timestamp: u64,
}

impl Donation {
    pub fn validate(&self) -> Result<()> {
        if self.amount_microcredits == 0 {
            return Err(DonateError::InvalidInput("amount must be positive".into()));
        }
        for (role, address) in [("sender", &self.sender), ("recipient", &self.recipient)] {
            if !is_address(address) {
                return Err(DonateError::InvalidInput(format!("{} is not an address: {}", role, address)));
            }
        }
        if self.sender.eq_ignore_ascii_case(&self.recipient) {
            return Err(DonateError::InvalidInput("cannot donate to yourself".into()));
        }
        Ok(())
    }
}

/// shape check only; the wallet does the real validation
pub fn is_address(value: &str) -> bool {
    value
        .strip_prefix(ADDRESS_PREFIX)
        .map(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()))
        .unwrap_or(false)
}

/// step 1: public transfer of the donated amount
pub fn donation_transfer(fee: &FeeConfig, donation: &Donation) -> TransactionRequest {
    fee.request(
        &donation.sender,
        Transition {
            program: CREDITS_PROGRAM.into(),
            function: TRANSFER_PUBLIC.into(),
            inputs: vec![
                donation.recipient.clone(),
                format!("{}u64", donation.amount_microcredits),
            ],
        },
    )
}

/// step 2: private donation record
pub fn donation_record(fee: &FeeConfig, program_id: &str, donation: &Donation) -> TransactionRequest {
    fee.request(
        &donation.sender,
        Transition {
            program: program_id.into(),
            function: SEND_DONATION.into(),
            inputs: vec![
                donation.sender.clone(),
                donation.recipient.clone(),
                format!("{}u64", donation.amount_microcredits),
                encode_field(&donation.message),
                format!("{}u64", donation.timestamp),
            ],
        },
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileAction {
    Create,
    Update,
}

/// public profile call: `[name_field, bio_field]`
pub fn profile_transaction(
    fee: &FeeConfig,
    program_id: &str,
    address: &str,
    action: ProfileAction,
    name: &str,
    bio: &str,
) -> TransactionRequest {
    let function = match action {
        ProfileAction::Create => CREATE_PROFILE,
        ProfileAction::Update => UPDATE_PROFILE,
    };
    fee.request(
        address,
        Transition {
            program: program_id.into(),
            function: function.into(),
            inputs: vec![encode_field(name), encode_field(bio)],
        },
    )
}

/// transaction ids of a completed donation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationReceipt {
    pub transfer_id: String,
    pub record_id: String,
}

/// submits donations and profile updates through the wallet
pub struct DonationSubmitter<'a> {
    wallet: &'a dyn WalletAdapter,
    runner: RetryRunner,
    program_id: String,
    fee: FeeConfig,
}

impl<'a> DonationSubmitter<'a> {
    pub fn new(wallet: &'a dyn WalletAdapter, runner: RetryRunner, program_id: impl Into<String>, fee: FeeConfig) -> Self {
        Self {
            wallet,
            runner,
            program_id: program_id.into(),
            fee,
        }
    }

    /// both transactions for `donation`, in submission order
    pub fn plan(&self, donation: &Donation) -> Result<[TransactionRequest; 2]> {
        donation.validate()?;
        Ok([
            donation_transfer(&self.fee, donation),
            donation_record(&self.fee, &self.program_id, donation),
        ])
    }

    /// submit transfer then record
    ///
    /// a record failure after a successful transfer is reported as
    /// [`DonateError::PartialDonation`] so the transfer id is never lost.
    pub async fn donate(&self, donation: &Donation) -> Result<DonationReceipt> {
        let [transfer, record] = self.plan(donation)?;
        let submitter = self
            .wallet
            .submitter()
            .ok_or(DonateError::CapabilityAbsent("requestTransaction"))?;

        let transfer_id = self
            .runner
            .run("transfer_public", || submitter.request_transaction(&transfer))
            .await?;
        info!("donation transfer submitted: {}", transfer_id);

        let record_id = match self
            .runner
            .run("send_donation", || submitter.request_transaction(&record))
            .await
        {
            Ok(id) => id,
            Err(source) => {
                warn!("donation record failed after transfer {}: {}", transfer_id, source);
                return Err(DonateError::PartialDonation { transfer_id, source });
            }
        };
        info!("donation record submitted: {}", record_id);

        Ok(DonationReceipt { transfer_id, record_id })
    }

    pub async fn submit_profile(&self, action: ProfileAction, name: &str, bio: &str) -> Result<String> {
        let address = self
            .wallet
            .public_key()
            .ok_or_else(|| DonateError::InvalidInput("wallet not connected".into()))?;
        if name.trim().is_empty() {
            return Err(DonateError::InvalidInput("profile name is empty".into()));
        }
        let submitter = self
            .wallet
            .submitter()
            .ok_or(DonateError::CapabilityAbsent("requestTransaction"))?;

        let request = profile_transaction(&self.fee, &self.program_id, &address, action, name, bio);
        let id = self
            .runner
            .run("profile", || submitter.request_transaction(&request))
            .await?;
        info!("profile {:?} submitted: {}", action, id);
        Ok(id)
    }
}

const NETWORK_HINTS: &[&str] = &["network", "chain", "permission", "not granted", "not allowed"];

/// user-facing message for a failed submission
pub fn describe_submission_error(error: &DonateError) -> String {
    let wallet_error = match error {
        DonateError::Wallet(e) | DonateError::PartialDonation { source: e, .. } => e,
        DonateError::CapabilityAbsent(_) => {
            return "this wallet cannot submit transactions".to_string();
        }
        other => return other.to_string(),
    };

    let detail = match wallet_error {
        WalletError::UserCancelled(msg) => format!("cancelled in wallet: {}", msg),
        WalletError::InvalidParameters(msg) => {
            format!("the wallet rejected the request as invalid ({}); check amount and addresses", msg)
        }
        WalletError::Exhausted { last, .. } => {
            let lower = last.to_lowercase();
            if NETWORK_HINTS.iter().any(|hint| lower.contains(hint)) {
                format!(
                    "wallet network or permissions do not match this app ({}); switch network and reconnect",
                    last
                )
            } else {
                format!("transaction failed: {}", last)
            }
        }
    };

    match error {
        DonateError::PartialDonation { transfer_id, .. } => {
            format!("transfer {} went through but the donation record did not: {}", transfer_id, detail)
        }
        _ => detail,
    }
}

/// render microcredits as credits, trailing zeros trimmed
pub fn format_credits(microcredits: u64) -> String {
    let whole = microcredits / MICROCREDITS_PER_CREDIT;
    let frac = microcredits % MICROCREDITS_PER_CREDIT;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:06}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// parse a credits amount ("1.5") into microcredits
pub fn parse_credits(text: &str) -> Result<u64> {
    let invalid = || DonateError::InvalidInput(format!("not a credits amount: {}", text));
    let text = text.trim();
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    if (whole.is_empty() && frac.is_empty())
        || frac.len() > 6
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac: u64 = if frac.is_empty() { 0 } else { format!("{:0<6}", frac).parse().map_err(|_| invalid())? };

    whole
        .checked_mul(MICROCREDITS_PER_CREDIT)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WalletFailure;
    use crate::retry::RetryPolicy;
    use crate::wallet::TransactionSubmitter;
    use async_trait::async_trait;

    const ALICE: &str = "aleo1alice";
    const BOB: &str = "aleo1bob";

    fn fee() -> FeeConfig {
        FeeConfig {
            chain_id: "testnetbeta".into(),
            fee_microcredits: 500_000,
            fee_private: false,
        }
    }

    fn donation() -> Donation {
        Donation {
            sender: ALICE.into(),
            recipient: BOB.into(),
            amount_microcredits: 2_500_000,
            message: "hi".into(),
            timestamp: 1_700_000_000,
        }
    }

    /// records submitted requests, fails the n-th one
    struct RecordingWallet {
        submitted: parking_lot::Mutex<Vec<TransactionRequest>>,
        fail_on: Option<(usize, &'static str)>,
    }

    impl RecordingWallet {
        fn new(fail_on: Option<(usize, &'static str)>) -> Self {
            Self {
                submitted: parking_lot::Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl TransactionSubmitter for RecordingWallet {
        async fn request_transaction(&self, request: &TransactionRequest) -> std::result::Result<String, WalletFailure> {
            let mut submitted = self.submitted.lock();
            let index = submitted.len();
            submitted.push(request.clone());
            match self.fail_on {
                Some((n, msg)) if n == index => Err(WalletFailure::new(msg)),
                _ => Ok(format!("at1tx{}", index)),
            }
        }
    }

    impl WalletAdapter for RecordingWallet {
        fn public_key(&self) -> Option<String> {
            Some(ALICE.into())
        }

        fn submitter(&self) -> Option<&dyn TransactionSubmitter> {
            Some(self)
        }
    }

    fn single_attempt() -> RetryRunner {
        RetryRunner::new(RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        })
    }

    #[test]
    fn test_transfer_inputs() {
        let tx = donation_transfer(&fee(), &donation());
        assert_eq!(tx.transitions[0].program, "credits.aleo");
        assert_eq!(tx.transitions[0].function, "transfer_public");
        assert_eq!(tx.transitions[0].inputs, vec![BOB.to_string(), "2500000u64".to_string()]);
        assert_eq!(tx.fee, 500_000);
    }

    #[test]
    fn test_record_inputs_order() {
        let tx = donation_record(&fee(), "donation_v1.aleo", &donation());
        assert_eq!(
            tx.transitions[0].inputs,
            vec![
                ALICE.to_string(),
                BOB.to_string(),
                "2500000u64".to_string(),
                "26729field".to_string(),
                "1700000000u64".to_string(),
            ]
        );
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let json = serde_json::to_value(donation_transfer(&fee(), &donation())).unwrap();
        assert_eq!(json["chainId"], "testnetbeta");
        assert_eq!(json["feePrivate"], false);
    }

    #[test]
    fn test_validate_rejects_bad_donations() {
        let mut d = donation();
        d.amount_microcredits = 0;
        assert!(d.validate().is_err());

        let mut d = donation();
        d.recipient = ALICE.into();
        assert!(d.validate().is_err());

        let mut d = donation();
        d.recipient = "0xdeadbeef".into();
        assert!(d.validate().is_err());
    }

    #[tokio::test]
    async fn test_donate_submits_in_order() {
        let wallet = RecordingWallet::new(None);
        let submitter = DonationSubmitter::new(&wallet, single_attempt(), "donation_v1.aleo", fee());

        let receipt = submitter.donate(&donation()).await.unwrap();

        assert_eq!(receipt.transfer_id, "at1tx0");
        assert_eq!(receipt.record_id, "at1tx1");
        let submitted = wallet.submitted.lock();
        assert_eq!(submitted[0].transitions[0].function, TRANSFER_PUBLIC);
        assert_eq!(submitted[1].transitions[0].function, SEND_DONATION);
    }

    #[tokio::test]
    async fn test_cancelled_transfer_stops_donation() {
        let wallet = RecordingWallet::new(Some((0, "User rejected transaction")));
        let submitter = DonationSubmitter::new(&wallet, single_attempt(), "donation_v1.aleo", fee());

        let err = submitter.donate(&donation()).await.unwrap_err();

        assert!(matches!(err, DonateError::Wallet(WalletError::UserCancelled(_))));
        assert_eq!(wallet.submitted.lock().len(), 1);
        assert!(describe_submission_error(&err).starts_with("cancelled in wallet"));
    }

    #[tokio::test]
    async fn test_record_failure_is_partial() {
        let wallet = RecordingWallet::new(Some((1, "User rejected transaction")));
        let submitter = DonationSubmitter::new(&wallet, single_attempt(), "donation_v1.aleo", fee());

        let err = submitter.donate(&donation()).await.unwrap_err();

        match &err {
            DonateError::PartialDonation { transfer_id, .. } => assert_eq!(transfer_id, "at1tx0"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(describe_submission_error(&err).contains("at1tx0"));
    }

    #[tokio::test]
    async fn test_missing_submitter() {
        let wallet = crate::wallet::SnapshotWallet::default();
        let submitter = DonationSubmitter::new(&wallet, single_attempt(), "donation_v1.aleo", fee());
        let err = submitter.donate(&donation()).await.unwrap_err();
        assert!(matches!(err, DonateError::CapabilityAbsent(_)));
    }

    #[tokio::test]
    async fn test_profile_submission() {
        let wallet = RecordingWallet::new(None);
        let submitter = DonationSubmitter::new(&wallet, single_attempt(), "donation_v1.aleo", fee());

        submitter.submit_profile(ProfileAction::Update, "hi", "").await.unwrap();

        let submitted = wallet.submitted.lock();
        assert_eq!(submitted[0].transitions[0].function, UPDATE_PROFILE);
        assert_eq!(submitted[0].transitions[0].inputs, vec!["26729field".to_string(), "0field".to_string()]);
    }

    #[test]
    fn test_describe_network_mismatch() {
        let err = DonateError::Wallet(WalletError::Exhausted {
            operation: "transfer_public".into(),
            attempts: 3,
            last: "Permission not granted for network".into(),
        });
        assert!(describe_submission_error(&err).contains("network or permissions"));

        let err = DonateError::Wallet(WalletError::Exhausted {
            operation: "transfer_public".into(),
            attempts: 3,
            last: "insufficient balance".into(),
        });
        assert_eq!(describe_submission_error(&err), "transaction failed: insufficient balance");
    }

    #[test]
    fn test_credits_formatting() {
        assert_eq!(format_credits(0), "0");
        assert_eq!(format_credits(1_000_000), "1");
        assert_eq!(format_credits(1_500_000), "1.5");
        assert_eq!(format_credits(1), "0.000001");
    }

    #[test]
    fn test_parse_credits() {
        assert_eq!(parse_credits("1.5").unwrap(), 1_500_000);
        assert_eq!(parse_credits("2").unwrap(), 2_000_000);
        assert_eq!(parse_credits(".25").unwrap(), 250_000);
        assert!(parse_credits("1.0000001").is_err());
        assert!(parse_credits("-1").is_err());
        assert!(parse_credits("").is_err());
        assert!(parse_credits("abc").is_err());
    }
}
