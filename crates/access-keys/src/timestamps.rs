use crate::{ledger::KeychainLedger, types::AccessKey};
use futures::{StreamExt as _, stream};
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tempo_telemetry_util::error_field;
use tracing::warn;

/// Best-effort cache of block timestamps used for `AccessKey::created_at`.
///
/// Block timestamps never change, so a cached block is not queried again
/// while some key still refers to it. Failed lookups are retried on the next
/// call.
pub struct BlockTimestamps<L> {
    ledger: Arc<L>,
    concurrency: usize,
    cache: Mutex<HashMap<u64, u64>>,
}

impl<L: KeychainLedger> BlockTimestamps<L> {
    /// At most `concurrency` lookups are in flight at once.
    pub fn new(ledger: Arc<L>, concurrency: usize) -> Self {
        Self {
            ledger,
            concurrency: concurrency.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Sets `created_at` on every key whose block timestamp can be resolved.
    ///
    /// Cached blocks no key in `keys` refers to are evicted.
    pub async fn resolve(&self, keys: &mut [AccessKey]) {
        let missing: BTreeSet<u64> = {
            let cache = self.cache.lock();
            keys.iter()
                .map(|key| key.block_number)
                .filter(|block| !cache.contains_key(block))
                .collect()
        };

        let fetched: Vec<(u64, Option<u64>)> = stream::iter(missing)
            .map(|block| async move {
                let timestamp = self
                    .ledger
                    .block_timestamp(block)
                    .await
                    .inspect_err(|error| {
                        warn!(
                            block,
                            error = error_field(error),
                            "failed resolving block timestamp"
                        );
                    })
                    .ok()
                    .flatten();
                (block, timestamp)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let current: BTreeSet<u64> = keys.iter().map(|key| key.block_number).collect();
        let mut cache = self.cache.lock();
        cache.retain(|block, _| current.contains(block));
        cache.extend(
            fetched
                .into_iter()
                .filter_map(|(block, timestamp)| Some((block, timestamp?))),
        );
        for key in keys {
            key.created_at = cache.get(&key.block_number).copied();
        }
    }
}
