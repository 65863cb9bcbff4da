use crate::{
    error::LedgerError,
    ledger::{
        BlockRange, KeyAuthorizedEvent, KeyRevokedEvent, KeychainLedger, SpendingLimitUpdatedEvent,
    },
};
use alloy::primitives::Address;
use std::sync::Arc;
use tempo_telemetry_util::error_field;
use tracing::{instrument, warn};

/// Largest lookback accepted by the ledger's range queries, minus headroom.
pub const MAX_LOOKBACK_WINDOW: u64 = 99_000;

/// One of the three keychain event queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventStream {
    KeyAuthorized,
    KeyRevoked,
    SpendingLimitUpdated,
}

impl EventStream {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::KeyAuthorized => "KeyAuthorized",
            Self::KeyRevoked => "KeyRevoked",
            Self::SpendingLimitUpdated => "SpendingLimitUpdated",
        }
    }
}

impl std::fmt::Display for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keychain events of one account, each list in emission order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountEvents {
    pub range: Option<BlockRange>,
    pub authorized: Vec<KeyAuthorizedEvent>,
    pub revoked: Vec<KeyRevokedEvent>,
    pub limits: Vec<SpendingLimitUpdatedEvent>,
    /// Queries that failed; their lists are empty.
    pub failed: Vec<EventStream>,
}

impl AccountEvents {
    pub fn latest_block(&self) -> u64 {
        self.range.map_or(0, |range| range.to)
    }

    /// At least one query failed.
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn is_complete(&self, stream: EventStream) -> bool {
        !self.failed.contains(&stream)
    }
}

/// Fetches an account's raw keychain events over a bounded recent window.
pub struct LogReader<L> {
    ledger: Arc<L>,
    window: u64,
}

impl<L: KeychainLedger> LogReader<L> {
    /// Windows above [`MAX_LOOKBACK_WINDOW`] are clamped.
    pub fn new(ledger: Arc<L>, window: u64) -> Self {
        if window > MAX_LOOKBACK_WINDOW {
            warn!(
                window,
                max = MAX_LOOKBACK_WINDOW,
                "lookback window exceeds the ledger's range limit; clamping"
            );
        }
        Self {
            ledger,
            window: window.min(MAX_LOOKBACK_WINDOW),
        }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Reads all three event streams for `account`.
    ///
    /// Only a failure to read the latest block fails the whole read.
    #[instrument(skip(self), fields(window = self.window))]
    pub async fn read(&self, account: Address) -> Result<AccountEvents, LedgerError> {
        let latest = self.ledger.latest_block().await?;
        let range = BlockRange::ending_at(latest, self.window);

        let (authorized, revoked, limits) = tokio::join!(
            self.ledger.key_authorized_events(account, range),
            self.ledger.key_revoked_events(account, range),
            self.ledger.spending_limit_events(account, range),
        );

        let mut failed = Vec::new();
        let mut authorized = unwrap_or_failed(authorized, EventStream::KeyAuthorized, &mut failed);
        let mut revoked = unwrap_or_failed(revoked, EventStream::KeyRevoked, &mut failed);
        let mut limits = unwrap_or_failed(limits, EventStream::SpendingLimitUpdated, &mut failed);

        authorized.sort_by_key(|event| event.position);
        revoked.sort_by_key(|event| event.position);
        limits.sort_by_key(|event| event.position);

        Ok(AccountEvents {
            range: Some(range),
            authorized,
            revoked,
            limits,
            failed,
        })
    }
}

fn unwrap_or_failed<T>(
    result: Result<Vec<T>, LedgerError>,
    stream: EventStream,
    failed: &mut Vec<EventStream>,
) -> Vec<T> {
    result.unwrap_or_else(|error| {
        warn!(event = %stream, error = error_field(&error), "keychain log query failed");
        failed.push(stream);
        Vec::new()
    })
}
