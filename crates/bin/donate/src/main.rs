//! donate CLI
//!
//! offline companion for the private donation client. works against a
//! wallet snapshot (records + decrypted plaintexts exported as json), so it
//! can reconcile history and build transactions but never signs.
//!
//! ## usage
//!
//! ```bash
//! # field codec
//! donate encode "thanks!"
//! donate decode 26729field
//!
//! # history of the snapshot's account, refreshed every 10s
//! donate --wallet snapshot.json history --watch 10
//!
//! # dry-run a donation
//! donate donate --from aleo1... --to aleo1... --amount 1.5 --message gm
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use donate_core::{
    config::ClientConfig,
    parse_record,
    transaction::profile_transaction,
    DonatePreferences, Donation, DonationRecord, DonationSubmitter, HistoryReconciler,
    HistoryView, LocalCache, ProfileAction, RetryRunner, SnapshotWallet, WalletAdapter,
};

#[derive(Parser, Debug)]
#[command(name = "donate")]
#[command(about = "private donation client tools", long_about = None)]
struct Cli {
    /// client config (toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// exported wallet snapshot (json)
    #[arg(long, global = true)]
    wallet: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode text as a field literal
    Encode { text: String },

    /// Decode a field literal back to text
    Decode { field: String },

    /// Parse one decrypted record body and print it as json
    Parse { file: PathBuf },

    /// Reconcile donation history from the wallet snapshot
    History {
        /// Address to reconcile for (defaults to the snapshot's account)
        #[arg(short, long)]
        address: Option<String>,

        /// Keep polling and reprint every N seconds
        #[arg(long)]
        watch: Option<u64>,
    },

    /// Build the two donation transactions (dry run)
    Donate {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Amount in credits, e.g. 1.5
        #[arg(long)]
        amount: String,

        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Build a profile transaction (dry run)
    Profile {
        #[arg(short, long)]
        address: String,

        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        bio: String,

        /// Update an existing profile instead of creating one
        #[arg(long)]
        update: bool,
    },

    /// Read or write cached quick-donate preferences
    Prefs {
        /// Cache directory
        #[arg(long, default_value = "./donate-cache")]
        cache: PathBuf,

        #[arg(short, long)]
        address: String,

        /// Preset amounts in credits
        #[arg(long, num_args = 1..)]
        amounts: Vec<String>,

        #[arg(short, long)]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "donate=info,donate_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClientConfig::default(),
    };

    match cli.command {
        Commands::Encode { text } => {
            if text.len() > donate_core::codec::FIELD_TEXT_MAX_BYTES {
                warn!(
                    "text is longer than {} bytes and will be truncated",
                    donate_core::codec::FIELD_TEXT_MAX_BYTES
                );
            }
            println!("{}", donate_core::encode_field(&text));
        }

        Commands::Decode { field } => {
            println!("{}", donate_core::decode_field(&field));
        }

        Commands::Parse { file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let Some(record) = parse_record(&body) else {
                bail!("{} is not a donation record", file.display());
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Commands::History { address, watch } => {
            let wallet = open_wallet(cli.wallet.as_ref())?;
            let subject = address
                .or_else(|| wallet.public_key())
                .context("no address given and the snapshot has none")?;
            run_history(Arc::new(wallet), &config, subject, watch).await?;
        }

        Commands::Donate {
            from,
            to,
            amount,
            message,
        } => {
            let donation = Donation {
                sender: from,
                recipient: to,
                amount_microcredits: donate_core::parse_credits(&amount)?,
                message,
                timestamp: Utc::now().timestamp().max(0) as u64,
            };
            let wallet = SnapshotWallet::default();
            let submitter = DonationSubmitter::new(
                &wallet,
                RetryRunner::new(config.retry_policy()),
                config.program_id.clone(),
                config.fee(),
            );
            let plan = submitter.plan(&donation)?;
            info!(
                "donating {} credits to {}",
                donate_core::format_credits(donation.amount_microcredits),
                donation.recipient
            );
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        Commands::Profile {
            address,
            name,
            bio,
            update,
        } => {
            if name.trim().is_empty() {
                bail!("profile name is empty");
            }
            let action = if update {
                ProfileAction::Update
            } else {
                ProfileAction::Create
            };
            let request =
                profile_transaction(&config.fee(), &config.program_id, &address, action, &name, &bio);
            println!("{}", serde_json::to_string_pretty(&request)?);
        }

        Commands::Prefs {
            cache,
            address,
            amounts,
            message,
        } => {
            let cache = LocalCache::open(&cache)?;
            let mut prefs = cache.preferences(&address);

            if !amounts.is_empty() || message.is_some() {
                if !amounts.is_empty() {
                    prefs.amounts = amounts
                        .iter()
                        .map(|a| donate_core::parse_credits(a))
                        .collect::<donate_core::Result<Vec<_>>>()?;
                }
                if let Some(message) = message {
                    prefs.default_message = message;
                }
                cache.store_preferences(&address, &prefs);
                info!("saved preferences for {}", address);
            }

            print_prefs(&prefs);
        }
    }

    Ok(())
}

fn open_wallet(path: Option<&PathBuf>) -> Result<SnapshotWallet> {
    let path = path.context("--wallet <snapshot.json> is required")?;
    SnapshotWallet::open(path).with_context(|| format!("opening wallet snapshot {}", path.display()))
}

async fn run_history(
    wallet: Arc<SnapshotWallet>,
    config: &ClientConfig,
    subject: String,
    watch: Option<u64>,
) -> Result<()> {
    let Some(secs) = watch else {
        let history = HistoryReconciler::new(wallet, config.history());
        let view = history.fetch_view(&subject).await?;
        print_view(&subject, &view);
        return Ok(());
    };

    let mut history_config = config.history();
    history_config.poll_interval = Duration::from_secs(secs.max(1));
    let history = HistoryReconciler::new(wallet, history_config);
    history.set_subject(Some(subject.clone())).await;

    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    let mut last_seen = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("stopping");
                break;
            }
        }

        let state = history.snapshot().await;
        if let Some(error) = &state.error {
            warn!("last refresh failed: {}", error);
        }
        if state.last_updated.is_some() && state.last_updated != last_seen {
            last_seen = state.last_updated;
            print_view(&subject, &state.view);
        }
    }

    history.set_subject(None).await;
    Ok(())
}

fn print_view(subject: &str, view: &HistoryView) {
    println!("donations for {}", subject);

    println!(
        "received ({}, {} credits)",
        view.received.len(),
        donate_core::format_credits(view.total_received())
    );
    for record in &view.received {
        print_record(record);
    }

    println!(
        "sent ({}, {} credits)",
        view.sent.len(),
        donate_core::format_credits(view.total_sent())
    );
    for record in &view.sent {
        print_record(record);
    }
}

fn print_record(record: &DonationRecord) {
    let when = DateTime::<Utc>::from_timestamp(record.timestamp as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| record.timestamp.to_string());
    let arrow = match record.sender() {
        Some(sender) => format!("from {}", sender),
        None => format!("to {}", record.counterparty.address()),
    };
    let message = record.message_text().unwrap_or_default();

    println!(
        "  {}  {:>12}  {}  {}",
        when,
        donate_core::format_credits(record.amount_microcredits),
        arrow,
        message
    );
}

fn print_prefs(prefs: &DonatePreferences) {
    let amounts: Vec<String> = prefs
        .amounts
        .iter()
        .map(|a| donate_core::format_credits(*a))
        .collect();
    println!("amounts: {}", amounts.join(", "));
    println!("message: {}", prefs.default_message);
}
