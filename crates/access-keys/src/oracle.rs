use crate::{
    error::LedgerError,
    ledger::{KeychainLedger, RemainingLimitRequest},
    types::AccessKey,
};
use alloy::primitives::{Address, U256};
use futures::{StreamExt as _, stream};
use std::sync::Arc;
use tempo_telemetry_util::error_field;
use tracing::{debug, warn};

/// Which keychain read answers "how much can this key still spend".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitAbi {
    /// `getRemainingLimit(account, keyId, token)`
    #[default]
    Current,
    /// `spendingLimit(account, keyId, token)` on older deployments.
    Legacy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OracleConfig {
    /// Maximum remaining-limit reads in flight for a single key.
    pub concurrency: usize,
    pub abi: LimitAbi,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            abi: LimitAbi::Current,
        }
    }
}

/// Point reads of a key's remaining per-token allowance.
pub struct SpendingLimitOracle<L> {
    ledger: Arc<L>,
    config: OracleConfig,
}

impl<L: KeychainLedger> SpendingLimitOracle<L> {
    pub fn new(ledger: Arc<L>, config: OracleConfig) -> Self {
        Self { ledger, config }
    }

    /// Remaining amount of `token` for `key_id`; `None` when the read failed.
    ///
    /// A failed read never means zero.
    pub async fn remaining(
        &self,
        account: Address,
        key_id: Address,
        token: Address,
    ) -> Option<U256> {
        let request = RemainingLimitRequest {
            account,
            key_id,
            token,
        };
        let response = match self.config.abi {
            LimitAbi::Current => self.ledger.remaining_limit(request).await,
            LimitAbi::Legacy => self.ledger.legacy_spending_limit(request).await,
        };
        response
            .map(|response| response.remaining)
            .inspect_err(|error: &LedgerError| {
                warn!(
                    %key_id,
                    %token,
                    error = error_field(error),
                    "remaining limit unknown; omitting token"
                );
            })
            .ok()
    }

    /// Fills `spending_limits` for every key that enforces limits.
    ///
    /// Keys are processed one after another; the tokens of a single key are read
    /// with bounded concurrency. Exhausted and unknown tokens are left out and
    /// remaining amounts never exceed the original limit.
    pub async fn populate(&self, account: Address, keys: &mut [AccessKey]) {
        for key in keys.iter_mut().filter(|key| !key.original_limits.is_empty()) {
            let key_id = key.key_id;
            let reads: Vec<(Address, Option<U256>)> =
                stream::iter(key.original_limits.keys().copied())
                    .map(|token| async move {
                        (token, self.remaining(account, key_id, token).await)
                    })
                    .buffer_unordered(self.config.concurrency.max(1))
                    .collect()
                    .await;

            key.spending_limits = reads
                .into_iter()
                .filter_map(|(token, remaining)| {
                    let original = key.original_limits.get(&token)?;
                    let remaining = remaining?.min(*original);
                    (!remaining.is_zero()).then_some((token, remaining))
                })
                .collect();

            debug!(
                %key_id,
                tokens = key.original_limits.len(),
                known = key.spending_limits.len(),
                "populated remaining limits"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeLedger, Query};
    use alloy::primitives::address;
    use std::collections::BTreeMap;
    use tempo_primitives::SignatureType;

    const ACCOUNT: Address = address!("0x00000000000000000000000000000000000000aa");
    const KEY: Address = address!("0x00000000000000000000000000000000000000bb");
    const TOKEN: Address = address!("0x00000000000000000000000000000000000000cc");

    fn key_with_limits(limits: &[(Address, u64)]) -> AccessKey {
        AccessKey {
            key_id: KEY,
            signature_type: SignatureType::P256,
            expiry: 0,
            block_number: 100,
            created_at: None,
            enforce_limits: true,
            spending_limits: BTreeMap::new(),
            original_limits: limits
                .iter()
                .map(|(token, amount)| (*token, U256::from(*amount)))
                .collect(),
        }
    }

    #[tokio::test]
    async fn remaining_limit_is_attached() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.set_remaining(ACCOUNT, KEY, TOKEN, U256::from(250));

        let mut keys = vec![key_with_limits(&[(TOKEN, 1000)])];
        SpendingLimitOracle::new(ledger, OracleConfig::default())
            .populate(ACCOUNT, &mut keys)
            .await;

        assert_eq!(
            keys[0].spending_limits,
            BTreeMap::from([(TOKEN, U256::from(250))])
        );
        assert_eq!(keys[0].original_limits.get(&TOKEN), Some(&U256::from(1000)));
    }

    #[tokio::test]
    async fn failed_and_exhausted_reads_are_omitted() {
        let exhausted = Address::repeat_byte(0xdd);
        let unknown = Address::repeat_byte(0xee);
        let ledger = Arc::new(FakeLedger::default());
        ledger.set_remaining(ACCOUNT, KEY, TOKEN, U256::from(5_000));
        ledger.set_remaining(ACCOUNT, KEY, exhausted, U256::ZERO);
        // No value configured for `unknown`; the fake reverts.

        let mut keys = vec![key_with_limits(&[(TOKEN, 1000), (exhausted, 10), (unknown, 10)])];
        SpendingLimitOracle::new(ledger, OracleConfig::default())
            .populate(ACCOUNT, &mut keys)
            .await;

        // Clamped to the original limit.
        assert_eq!(
            keys[0].spending_limits,
            BTreeMap::from([(TOKEN, U256::from(1000))])
        );
    }

    #[tokio::test]
    async fn legacy_abi_uses_legacy_read() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.set_remaining(ACCOUNT, KEY, TOKEN, U256::from(7));
        ledger.fail(Query::RemainingLimit);

        let oracle = SpendingLimitOracle::new(
            ledger.clone(),
            OracleConfig {
                concurrency: 1,
                abi: LimitAbi::Legacy,
            },
        );
        assert_eq!(oracle.remaining(ACCOUNT, KEY, TOKEN).await, Some(U256::from(7)));
        assert_eq!(ledger.count(Query::LegacySpendingLimit), 1);
        assert_eq!(ledger.count(Query::RemainingLimit), 0);
    }

    #[tokio::test]
    async fn keys_without_limits_are_not_queried() {
        let ledger = Arc::new(FakeLedger::default());
        let mut keys = vec![key_with_limits(&[])];
        SpendingLimitOracle::new(ledger.clone(), OracleConfig::default())
            .populate(ACCOUNT, &mut keys)
            .await;
        assert_eq!(ledger.count(Query::RemainingLimit), 0);
    }
}
