//! Periodic reconciliation of an account's keys, published over a watch channel.

use crate::{
    error::LedgerError,
    ledger::KeychainLedger,
    log_reader::{EventStream, LogReader, MAX_LOOKBACK_WINDOW},
    oracle::{OracleConfig, SpendingLimitOracle},
    overlay::{Overlay, SharedOverlay},
    reconciler::Reconciler,
    timestamps::BlockTimestamps,
    types::{KeySnapshot, unix_now},
};
use alloy::primitives::Address;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};
use tempo_telemetry_util::{display_duration, error_field};
use tokio::{
    sync::{Notify, watch},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, info, info_span, instrument, warn};

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Raised to [`MIN_POLL_INTERVAL`] when shorter.
    pub poll_interval: Duration,
    /// Number of blocks searched for keychain events; clamped to [`MAX_LOOKBACK_WINDOW`].
    pub lookback_window: u64,
    pub oracle: OracleConfig,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            lookback_window: MAX_LOOKBACK_WINDOW,
            oracle: OracleConfig::default(),
        }
    }
}

struct Inner<L> {
    reader: LogReader<L>,
    oracle: SpendingLimitOracle<L>,
    timestamps: BlockTimestamps<L>,
    overlays: Mutex<HashMap<Address, SharedOverlay>>,
    in_flight: Mutex<HashSet<Address>>,
    epochs: Mutex<HashMap<Address, u64>>,
    poll_interval: Duration,
}

/// Runs the poll pipeline for any number of accounts.
///
/// Cloning is cheap; clones share caches, overlays and in-flight state.
pub struct KeychainService<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for KeychainService<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: KeychainLedger> KeychainService<L> {
    pub fn new(ledger: Arc<L>, config: SubscriptionConfig) -> Self {
        if config.poll_interval < MIN_POLL_INTERVAL {
            warn!(
                poll_interval = %display_duration(config.poll_interval),
                min = %display_duration(MIN_POLL_INTERVAL),
                "poll interval too short; raising it"
            );
        }
        Self {
            inner: Arc::new(Inner {
                reader: LogReader::new(ledger.clone(), config.lookback_window),
                oracle: SpendingLimitOracle::new(ledger.clone(), config.oracle),
                timestamps: BlockTimestamps::new(ledger, config.oracle.concurrency),
                overlays: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
                epochs: Mutex::new(HashMap::new()),
                poll_interval: config.poll_interval.max(MIN_POLL_INTERVAL),
            }),
        }
    }

    /// The overlay of `account`, shared with signers acting for it.
    pub fn overlay(&self, account: Address) -> SharedOverlay {
        self.inner
            .overlays
            .lock()
            .entry(account)
            .or_insert_with(Overlay::shared)
            .clone()
    }

    /// Runs one poll cycle for `account`.
    ///
    /// Returns `Ok(None)` without querying anything while another cycle for the
    /// same account is still running.
    #[instrument(skip_all, fields(%account))]
    pub async fn poll_once(&self, account: Address) -> Result<Option<KeySnapshot>, LedgerError> {
        let Some(_guard) = InFlightGuard::acquire(&self.inner, account) else {
            debug!("previous poll still in flight; skipping");
            return Ok(None);
        };
        let started = Instant::now();

        let events = self.inner.reader.read(account).await?;
        let now = unix_now();
        let mut keys = Reconciler::new(account).reconcile_events(&events, now);
        self.inner.oracle.populate(account, &mut keys).await;
        self.inner.timestamps.resolve(&mut keys).await;

        let shared = self.overlay(account);
        let mut overlay = shared.lock();
        overlay.prune_expired(now);
        overlay.reconcile(&keys, events.is_complete(EventStream::KeyAuthorized));

        let snapshot = KeySnapshot {
            account,
            generation: 0,
            block: events.latest_block(),
            keys,
            pending: overlay.pending().to_vec(),
            revoking: overlay.revoking().clone(),
            degraded: events.is_degraded(),
        };
        info!(
            block = snapshot.block,
            keys = snapshot.keys.len(),
            pending = snapshot.pending.len(),
            degraded = snapshot.degraded,
            elapsed = %display_duration(started.elapsed()),
            "poll finished"
        );
        Ok(Some(snapshot))
    }

    /// Starts polling `account` every poll interval, the first poll immediately.
    ///
    /// A newer subscription for the same account supersedes this one: results
    /// of the older task are discarded and the task stops.
    pub fn subscribe(&self, account: Address) -> Subscription {
        let epoch = {
            let mut epochs = self.inner.epochs.lock();
            let epoch = epochs.entry(account).or_default();
            *epoch += 1;
            *epoch
        };
        let (sender, receiver) = watch::channel(Arc::new(KeySnapshot::empty(account)));
        let cancel = CancellationToken::new();
        let refresh = Arc::new(Notify::new());

        tokio::spawn(
            self.clone()
                .run(account, epoch, sender, cancel.clone(), refresh.clone())
                .instrument(info_span!("keychain_subscription", %account, epoch)),
        );

        Subscription {
            account,
            receiver,
            cancel,
            refresh,
        }
    }

    fn is_current(&self, account: Address, epoch: u64) -> bool {
        self.inner.epochs.lock().get(&account) == Some(&epoch)
    }

    async fn run(
        self,
        account: Address,
        epoch: u64,
        sender: watch::Sender<Arc<KeySnapshot>>,
        cancel: CancellationToken,
        refresh: Arc<Notify>,
    ) {
        let mut interval = tokio::time::interval(self.inner.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut generation = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
                _ = refresh.notified() => {}
            }
            if !self.is_current(account, epoch) {
                debug!("subscription superseded");
                break;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.poll_once(account) => result,
            };
            if !self.is_current(account, epoch) {
                debug!("subscription superseded; discarding poll result");
                break;
            }

            match result {
                Ok(Some(mut snapshot)) => {
                    generation += 1;
                    snapshot.generation = generation;
                    if sender.send(Arc::new(snapshot)).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(error) => warn!(
                    error = error_field(&error),
                    "poll failed; keeping previous snapshot"
                ),
            }
        }
        debug!("subscription stopped");
    }
}

/// Handle to a running subscription. Dropping it stops the polling task.
#[derive(Debug)]
pub struct Subscription {
    account: Address,
    receiver: watch::Receiver<Arc<KeySnapshot>>,
    cancel: CancellationToken,
    refresh: Arc<Notify>,
}

impl Subscription {
    pub fn account(&self) -> Address {
        self.account
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<KeySnapshot> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next published snapshot.
    pub async fn changed(&mut self) -> Result<Arc<KeySnapshot>, watch::error::RecvError> {
        self.receiver.changed().await?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Polls again without waiting for the next interval, e.g. after a local
    /// submission changed the overlay.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct InFlightGuard<L> {
    inner: Arc<Inner<L>>,
    account: Address,
}

impl<L> InFlightGuard<L> {
    fn acquire(inner: &Arc<Inner<L>>, account: Address) -> Option<Self> {
        inner.in_flight.lock().insert(account).then(|| Self {
            inner: Arc::clone(inner),
            account,
        })
    }
}

impl<L> Drop for InFlightGuard<L> {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.account);
    }
}
