use crate::{
    ledger::{KeyAuthorizedEvent, KeyRevokedEvent, SpendingLimitUpdatedEvent},
    log_reader::AccountEvents,
    types::{AccessKey, is_expired},
};
use alloy::primitives::{Address, U256};
use std::collections::{BTreeMap, HashMap, HashSet, btree_map::Entry};
use tempo_primitives::SignatureType;
use tracing::warn;

/// Folds an account's keychain events into its currently valid access keys.
///
/// Reconciliation is pure: the same events and `now` always produce the same
/// keys, in the same order. Remaining limits and creation timestamps are left
/// empty for later stages to fill in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reconciler {
    account: Address,
}

impl Reconciler {
    pub fn new(account: Address) -> Self {
        Self { account }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn reconcile_events(&self, events: &AccountEvents, now: u64) -> Vec<AccessKey> {
        self.reconcile(&events.authorized, &events.revoked, &events.limits, now)
    }

    /// Returns valid keys ordered by authorizing block, newest first, ties by `key_id`.
    pub fn reconcile(
        &self,
        authorized: &[KeyAuthorizedEvent],
        revoked: &[KeyRevokedEvent],
        limits: &[SpendingLimitUpdatedEvent],
        now: u64,
    ) -> Vec<AccessKey> {
        let original_limits = self.original_limits(limits);

        let revoked: HashSet<Address> = revoked
            .iter()
            .filter(|event| event.account == self.account)
            .map(|event| event.key_id)
            .collect();

        let mut candidates: HashMap<Address, (SignatureType, u64, u64)> = HashMap::new();
        for event in authorized.iter().filter(|event| event.account == self.account) {
            if revoked.contains(&event.key_id) || is_expired(event.expiry, now) {
                continue;
            }
            let Ok(signature_type) = SignatureType::try_from(event.signature_type) else {
                warn!(
                    key_id = %event.key_id,
                    signature_type = event.signature_type,
                    block = event.position.block_number,
                    "skipping key with unknown signature type"
                );
                continue;
            };

            let block_number = event.position.block_number;
            match candidates.get(&event.key_id) {
                Some((_, _, seen)) if *seen >= block_number => {}
                _ => {
                    candidates.insert(event.key_id, (signature_type, event.expiry, block_number));
                }
            }
        }

        let mut keys: Vec<AccessKey> = candidates
            .into_iter()
            .map(|(key_id, (signature_type, expiry, block_number))| {
                let original_limits = original_limits.get(&key_id).cloned().unwrap_or_default();
                AccessKey {
                    key_id,
                    signature_type,
                    expiry,
                    block_number,
                    created_at: None,
                    enforce_limits: original_limits.values().any(|limit| !limit.is_zero()),
                    spending_limits: BTreeMap::new(),
                    original_limits,
                }
            })
            .collect();

        keys.sort_by(|a, b| {
            b.block_number
                .cmp(&a.block_number)
                .then_with(|| a.key_id.cmp(&b.key_id))
        });
        keys
    }

    /// First recorded limit per `(key_id, token)`; later updates never replace it.
    fn original_limits(
        &self,
        limits: &[SpendingLimitUpdatedEvent],
    ) -> HashMap<Address, BTreeMap<Address, U256>> {
        let mut ordered: Vec<&SpendingLimitUpdatedEvent> = limits
            .iter()
            .filter(|event| event.account == self.account)
            .collect();
        ordered.sort_by_key(|event| event.position);

        let mut originals: HashMap<Address, BTreeMap<Address, U256>> = HashMap::new();
        for event in ordered {
            let limits = originals.entry(event.key_id).or_default();
            if let Entry::Vacant(entry) = limits.entry(event.token) {
                entry.insert(event.new_limit);
            }
        }
        originals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LogPosition;
    use alloy::primitives::address;

    const ACCOUNT: Address = address!("0x00000000000000000000000000000000000000aa");
    const KEY: Address = address!("0x00000000000000000000000000000000000000bb");
    const TOKEN: Address = address!("0x00000000000000000000000000000000000000cc");
    const NOW: u64 = 1_700_000_000;

    fn at(block_number: u64) -> LogPosition {
        LogPosition {
            block_number,
            log_index: 0,
        }
    }

    fn authorized(
        key_id: Address,
        signature_type: u8,
        expiry: u64,
        block: u64,
    ) -> KeyAuthorizedEvent {
        KeyAuthorizedEvent {
            account: ACCOUNT,
            key_id,
            signature_type,
            expiry,
            position: at(block),
        }
    }

    fn revoked(key_id: Address, block: u64) -> KeyRevokedEvent {
        KeyRevokedEvent {
            account: ACCOUNT,
            key_id,
            position: at(block),
        }
    }

    fn limit(key_id: Address, amount: u64, block: u64) -> SpendingLimitUpdatedEvent {
        SpendingLimitUpdatedEvent {
            account: ACCOUNT,
            key_id,
            token: TOKEN,
            new_limit: U256::from(amount),
            position: at(block),
        }
    }

    #[test]
    fn single_authorization_yields_one_key() {
        let keys = Reconciler::new(ACCOUNT).reconcile(&[authorized(KEY, 1, 0, 100)], &[], &[], NOW);

        assert_eq!(
            keys,
            vec![AccessKey {
                key_id: KEY,
                signature_type: SignatureType::P256,
                expiry: 0,
                block_number: 100,
                created_at: None,
                enforce_limits: false,
                spending_limits: BTreeMap::new(),
                original_limits: BTreeMap::new(),
            }]
        );
    }

    #[test]
    fn revocation_removes_key_regardless_of_order() {
        let reconciler = Reconciler::new(ACCOUNT);
        let auth = [authorized(KEY, 1, 0, 100)];

        assert!(reconciler.reconcile(&auth, &[revoked(KEY, 150)], &[], NOW).is_empty());
        // A revocation observed at an earlier block still dominates.
        assert!(reconciler.reconcile(&auth, &[revoked(KEY, 50)], &[], NOW).is_empty());
    }

    #[test]
    fn first_recorded_limit_wins() {
        let keys = Reconciler::new(ACCOUNT).reconcile(
            &[authorized(KEY, 1, 0, 100)],
            &[],
            &[limit(KEY, 40, 120), limit(KEY, 100, 100)],
            NOW,
        );

        assert_eq!(keys[0].original_limits.get(&TOKEN), Some(&U256::from(100)));
        assert!(keys[0].enforce_limits);
    }

    #[test]
    fn zero_limits_do_not_enforce() {
        let keys = Reconciler::new(ACCOUNT).reconcile(
            &[authorized(KEY, 0, 0, 100)],
            &[],
            &[limit(KEY, 0, 100)],
            NOW,
        );
        assert!(!keys[0].enforce_limits);
    }

    #[test]
    fn expiry_is_evaluated_against_now() {
        let reconciler = Reconciler::new(ACCOUNT);

        assert!(reconciler
            .reconcile(&[authorized(KEY, 1, NOW - 1, 100)], &[], &[], NOW)
            .is_empty());
        assert!(reconciler
            .reconcile(&[authorized(KEY, 1, NOW, 100)], &[], &[], NOW)
            .is_empty());
        assert_eq!(
            reconciler
                .reconcile(&[authorized(KEY, 1, NOW + 1, 100)], &[], &[], NOW)
                .len(),
            1
        );
        assert_eq!(
            reconciler
                .reconcile(&[authorized(KEY, 1, 0, 100)], &[], &[], u64::MAX)
                .len(),
            1
        );
    }

    #[test]
    fn orders_newest_first_and_breaks_ties_by_key() {
        let low = Address::repeat_byte(0x01);
        let high = Address::repeat_byte(0x02);
        let newest = Address::repeat_byte(0x03);

        let keys = Reconciler::new(ACCOUNT).reconcile(
            &[
                authorized(high, 1, 0, 100),
                authorized(newest, 0, 0, 300),
                authorized(low, 1, 0, 100),
            ],
            &[],
            &[],
            NOW,
        );

        let ids: Vec<_> = keys.iter().map(|key| key.key_id).collect();
        assert_eq!(ids, vec![newest, low, high]);
    }

    #[test]
    fn duplicate_authorizations_keep_latest_block() {
        let keys = Reconciler::new(ACCOUNT).reconcile(
            &[authorized(KEY, 1, 0, 100), authorized(KEY, 0, 0, 200)],
            &[],
            &[],
            NOW,
        );
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].block_number, 200);
        assert_eq!(keys[0].signature_type, SignatureType::Secp256k1);
    }

    #[test]
    fn skips_unknown_signature_types_and_foreign_accounts() {
        let mut foreign = authorized(Address::repeat_byte(0x0f), 1, 0, 100);
        foreign.account = Address::repeat_byte(0xee);

        let keys = Reconciler::new(ACCOUNT).reconcile(
            &[authorized(KEY, 7, 0, 100), foreign],
            &[],
            &[],
            NOW,
        );
        assert!(keys.is_empty());
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let reconciler = Reconciler::new(ACCOUNT);
        let auth = [
            authorized(KEY, 1, 0, 100),
            authorized(Address::repeat_byte(0x02), 0, NOW + 60, 110),
        ];
        let limits = [limit(KEY, 1000, 100), limit(KEY, 250, 130)];

        let first = reconciler.reconcile(&auth, &[], &limits, NOW);
        let second = reconciler.reconcile(&auth, &[], &limits, NOW);
        assert_eq!(first, second);
    }
}
