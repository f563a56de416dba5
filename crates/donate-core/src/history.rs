//! donation history reconciliation
//!
//! the wallet's private records are the only source of truth. every cycle
//! (first load, manual refresh, poll tick, optimistic refresh) runs the full
//! fetch -> decrypt -> parse pipeline and replaces the view wholesale.
//!
//! overlapping cycles are not sequenced against each other: whichever
//! finishes last wins. a result is only dropped when the subject address
//! changed while it was in flight.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::WalletError;
use crate::parser::{parse_record, unix_now, Direction, DonationRecord};
use crate::records::RecordFetcher;
use crate::retry::{RetryPolicy, RetryRunner};
use crate::wallet::WalletAdapter;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_OPTIMISTIC_DELAY: Duration = Duration::from_secs(2);
/// shortest poll period; a zero interval is raised to this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// reconciler settings
#[derive(Clone, Debug)]
pub struct HistoryConfig {
    /// program whose records hold donations
    pub program_id: String,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    /// wait before the extra refresh after a local submission
    pub optimistic_delay: Duration,
}

impl HistoryConfig {
    pub fn new(program_id: impl Into<String>) -> Self {
        Self {
            program_id: program_id.into(),
            retry: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            optimistic_delay: DEFAULT_OPTIMISTIC_DELAY,
        }
    }
}

/// field the lists are ordered by, always descending
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Timestamp,
    Amount,
}

/// sent/received donations of one address
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryView {
    pub sent: Vec<DonationRecord>,
    pub received: Vec<DonationRecord>,
}

impl HistoryView {
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.received.is_empty()
    }

    pub fn total_sent(&self) -> u64 {
        self.sent.iter().map(|r| r.amount_microcredits).sum()
    }

    pub fn total_received(&self) -> u64 {
        self.received.iter().map(|r| r.amount_microcredits).sum()
    }
}

/// what a caller renders
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryState {
    pub subject: Option<String>,
    /// last good view
    pub view: HistoryView,
    /// a manual refresh is running
    pub loading: bool,
    /// message of the last failed manual refresh
    pub error: Option<String>,
    /// unix seconds of the last applied view
    pub last_updated: Option<u64>,
}

#[derive(Hash, PartialEq, Eq)]
enum RecordIdentity<'a> {
    Nonce(&'a str),
    Content(&'a DonationRecord),
}

fn identity(record: &DonationRecord) -> RecordIdentity<'_> {
    match record.nonce.as_deref() {
        Some(nonce) => RecordIdentity::Nonce(nonce),
        None => RecordIdentity::Content(record),
    }
}

/// split records into the subject's sent and received lists, newest first
pub fn partition(records: &[DonationRecord], subject: &str) -> HistoryView {
    partition_sorted_by(records, subject, SortKey::Timestamp)
}

/// like [`partition`] with a caller-chosen sort field
pub fn partition_sorted_by(records: &[DonationRecord], subject: &str, key: SortKey) -> HistoryView {
    let mut view = HistoryView::default();
    let mut seen = HashSet::new();

    for record in records {
        if !record.owner.eq_ignore_ascii_case(subject) {
            continue;
        }
        if !seen.insert(identity(record)) {
            continue;
        }
        match record.direction() {
            Direction::Sent => view.sent.push(record.clone()),
            Direction::Received => view.received.push(record.clone()),
        }
    }

    for list in [&mut view.sent, &mut view.received] {
        match key {
            SortKey::Timestamp => list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            SortKey::Amount => list.sort_by(|a, b| b.amount_microcredits.cmp(&a.amount_microcredits)),
        }
    }

    view
}

/// fetch, decrypt and parse every donation record the wallet holds
pub async fn load_donations(
    wallet: &dyn WalletAdapter,
    program_id: &str,
    runner: RetryRunner,
) -> Result<Vec<DonationRecord>, WalletError> {
    let plaintexts = RecordFetcher::new(wallet, runner).fetch_records(program_id).await?;
    let total = plaintexts.len();

    let records: Vec<DonationRecord> = plaintexts
        .iter()
        .filter_map(|p| {
            let parsed = parse_record(&p.plaintext);
            if parsed.is_none() {
                debug!("record {:?} is not a donation, dropping", p.id);
            }
            parsed
        })
        .collect();

    debug!("parsed {} donations from {} records", records.len(), total);
    Ok(records)
}

struct Shared {
    wallet: Arc<dyn WalletAdapter>,
    config: HistoryConfig,
    state: RwLock<HistoryState>,
}

impl Shared {
    async fn fetch_view(&self, subject: &str) -> Result<HistoryView, WalletError> {
        let runner = RetryRunner::new(self.config.retry);
        let records = load_donations(self.wallet.as_ref(), &self.config.program_id, runner).await?;
        Ok(partition(&records, subject))
    }

    /// replace the view if `subject` is still current
    async fn apply(&self, subject: &str, view: HistoryView) -> bool {
        let mut state = self.state.write().await;
        if state.subject.as_deref() != Some(subject) {
            debug!("subject changed during refresh, discarding result");
            return false;
        }
        state.view = view;
        state.last_updated = Some(unix_now());
        true
    }

    async fn current_subject(&self) -> Option<String> {
        self.state.read().await.subject.clone()
    }

    /// background path: failures are logged, the last view stays
    async fn poll(&self, subject: &str) {
        match self.fetch_view(subject).await {
            Ok(view) => {
                self.apply(subject, view).await;
            }
            Err(e) => warn!("history poll failed, keeping last view: {}", e),
        }
    }

    /// foreground path: drives `loading` and `error`
    async fn refresh(&self) -> Result<HistoryView, WalletError> {
        let Some(subject) = self.current_subject().await else {
            return Ok(HistoryView::default());
        };

        {
            let mut state = self.state.write().await;
            state.loading = true;
            state.error = None;
        }

        let result = self.fetch_view(&subject).await;

        let mut state = self.state.write().await;
        state.loading = false;
        if state.subject.as_deref() != Some(subject.as_str()) {
            debug!("subject changed during refresh, discarding result");
            return result;
        }
        match &result {
            Ok(view) => {
                state.view = view.clone();
                state.last_updated = Some(unix_now());
            }
            Err(e) => {
                warn!("history refresh failed: {}", e);
                state.error = Some(e.to_string());
            }
        }
        result
    }
}

/// keeps a polled {sent, received} view for one address
pub struct HistoryReconciler {
    shared: Arc<Shared>,
    /// dropping the sender stops the poll task
    poller: parking_lot::Mutex<Option<watch::Sender<()>>>,
}

impl HistoryReconciler {
    pub fn new(wallet: Arc<dyn WalletAdapter>, config: HistoryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                wallet,
                config,
                state: RwLock::new(HistoryState::default()),
            }),
            poller: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.shared.config
    }

    /// run the pipeline for `subject` without touching reconciler state
    pub async fn fetch_view(&self, subject: &str) -> Result<HistoryView, WalletError> {
        self.shared.fetch_view(subject).await
    }

    /// switch the tracked address
    ///
    /// `Some` loads immediately and then polls; `None` clears the view and
    /// stops polling. must be called inside a tokio runtime.
    pub async fn set_subject(&self, subject: Option<String>) {
        let subject = subject.filter(|s| !s.trim().is_empty());

        {
            let mut state = self.shared.state.write().await;
            if state.subject == subject {
                return;
            }
            *state = HistoryState {
                subject: subject.clone(),
                ..Default::default()
            };
        }

        self.stop_polling();
        if let Some(subject) = subject {
            self.start_polling(subject);
        }
    }

    /// manual refresh; a failure keeps the old view and fills `error`
    pub async fn refresh(&self) -> Result<HistoryView, WalletError> {
        self.shared.refresh().await
    }

    /// schedule one extra refresh after a local action changed chain state
    pub fn notify_optimistic(&self) {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let delay = self.shared.config.optimistic_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            if let Some(subject) = shared.current_subject().await {
                debug!("optimistic history refresh");
                shared.poll(&subject).await;
            }
        });
    }

    pub async fn snapshot(&self) -> HistoryState {
        self.shared.state.read().await.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    fn start_polling(&self, subject: String) {
        let (stop_tx, mut stop_rx) = watch::channel(());
        let shared = self.shared.clone();
        let period = shared.config.poll_interval.max(MIN_POLL_INTERVAL);

        info!("tracking donation history for {}", subject);

        tokio::spawn(async move {
            // first cycle behaves like a manual refresh
            let _ = shared.refresh().await;

            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                shared.poll(&subject).await;
            }

            debug!("stopped polling history for {}", subject);
        });

        *self.poller.lock() = Some(stop_tx);
    }

    fn stop_polling(&self) {
        // in-flight cycles finish; only future ticks are cancelled
        self.poller.lock().take();
    }
}

impl Drop for HistoryReconciler {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
