//! In-memory [`KeychainLedger`] for unit tests.

use crate::{
    error::LedgerError,
    ledger::{
        BlockRange, FeeEstimate, GetKeyRequest, GetKeyResponse, Inclusion, KeyAuthorizedEvent,
        KeyRevokedEvent, KeychainLedger, LogPosition, RemainingLimitRequest,
        RemainingLimitResponse, SpendingLimitUpdatedEvent,
    },
};
use alloy::{
    eips::Decodable2718 as _,
    primitives::{Address, B256, Bytes, U256, keccak256},
    sol_types::SolCall,
    transports::TransportErrorKind,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};
use tempo_contracts::precompiles::{ACCOUNT_KEYCHAIN_ADDRESS, IAccountKeychain};
use tempo_primitives::AASigned;

pub(crate) const CHAIN_ID: u64 = 42431;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Query {
    LatestBlock,
    KeyAuthorized,
    KeyRevoked,
    SpendingLimits,
    GetKey,
    RemainingLimit,
    LegacySpendingLimit,
    BlockTimestamp,
    ChainId,
    TransactionCount,
    FeeEstimate,
    SendRawTransaction,
    WaitForInclusion,
}

#[derive(Default)]
struct State {
    latest_block: u64,
    latest_block_delay: Option<Duration>,
    block_timestamp_delay: Option<Duration>,
    timestamps_in_flight: usize,
    max_timestamps_in_flight: usize,
    authorized: Vec<KeyAuthorizedEvent>,
    revoked: Vec<KeyRevokedEvent>,
    limits: Vec<SpendingLimitUpdatedEvent>,
    keys: HashMap<(Address, Address), GetKeyResponse>,
    remaining: HashMap<RemainingLimitRequest, U256>,
    timestamps: HashMap<u64, u64>,
    failing: HashSet<Query>,
    calls: HashMap<Query, usize>,
    ranges: Vec<BlockRange>,
    submitted: Vec<Bytes>,
    revert_submissions: bool,
}

/// Records every call, can fail any query on demand, and applies submitted
/// key authorizations and revocations as new keychain events.
#[derive(Default)]
pub(crate) struct FakeLedger {
    state: Mutex<State>,
}

impl FakeLedger {
    pub(crate) fn set_latest_block(&self, block: u64) {
        self.state.lock().latest_block = block;
    }

    pub(crate) fn set_latest_block_delay(&self, delay: Duration) {
        self.state.lock().latest_block_delay = Some(delay);
    }

    pub(crate) fn set_block_timestamp_delay(&self, delay: Duration) {
        self.state.lock().block_timestamp_delay = Some(delay);
    }

    /// Most `block_timestamp` calls that were running at the same time.
    pub(crate) fn max_concurrent_timestamps(&self) -> usize {
        self.state.lock().max_timestamps_in_flight
    }

    pub(crate) fn push_authorized(&self, event: KeyAuthorizedEvent) {
        self.state.lock().authorized.push(event);
    }

    pub(crate) fn push_revoked(&self, event: KeyRevokedEvent) {
        self.state.lock().revoked.push(event);
    }

    pub(crate) fn push_limit(&self, event: SpendingLimitUpdatedEvent) {
        self.state.lock().limits.push(event);
    }

    pub(crate) fn set_key(&self, account: Address, key: GetKeyResponse) {
        self.state.lock().keys.insert((account, key.key_id), key);
    }

    pub(crate) fn set_remaining(
        &self,
        account: Address,
        key_id: Address,
        token: Address,
        remaining: U256,
    ) {
        self.state.lock().remaining.insert(
            RemainingLimitRequest {
                account,
                key_id,
                token,
            },
            remaining,
        );
    }

    pub(crate) fn set_block_timestamp(&self, block: u64, timestamp: u64) {
        self.state.lock().timestamps.insert(block, timestamp);
    }

    pub(crate) fn fail(&self, query: Query) {
        self.state.lock().failing.insert(query);
    }

    /// Included transactions report a failed status.
    pub(crate) fn revert_submissions(&self) {
        self.state.lock().revert_submissions = true;
    }

    pub(crate) fn count(&self, query: Query) -> usize {
        self.state.lock().calls.get(&query).copied().unwrap_or_default()
    }

    pub(crate) fn ranges(&self) -> Vec<BlockRange> {
        self.state.lock().ranges.clone()
    }

    pub(crate) fn submitted(&self) -> Vec<AASigned> {
        self.state
            .lock()
            .submitted
            .iter()
            .map(|raw| {
                AASigned::decode_2718(&mut raw.as_ref())
                    .expect("submitted a valid tempo transaction")
            })
            .collect()
    }

    fn record(&self, query: Query) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        *state.calls.entry(query).or_default() += 1;
        if state.failing.contains(&query) {
            return Err(TransportErrorKind::custom_str("injected failure").into());
        }
        Ok(())
    }

    fn record_range(&self, query: Query, range: BlockRange) -> Result<(), LedgerError> {
        self.state.lock().ranges.push(range);
        self.record(query)
    }

    /// Emits the keychain events a successful transaction would produce.
    fn apply(state: &mut State, signed: &AASigned) {
        let Ok(account) = signed.recover_signer() else {
            return;
        };
        state.latest_block += 1;
        let position = LogPosition {
            block_number: state.latest_block,
            log_index: 0,
        };

        if let Some(signed_auth) = &signed.tx().key_authorization {
            let auth = &signed_auth.authorization;
            state.authorized.push(KeyAuthorizedEvent {
                account,
                key_id: auth.key_id,
                signature_type: auth.key_type.into(),
                expiry: auth.expiry,
                position,
            });
            for limit in &auth.limits {
                state.limits.push(SpendingLimitUpdatedEvent {
                    account,
                    key_id: auth.key_id,
                    token: limit.token,
                    new_limit: limit.limit,
                    position,
                });
                state.remaining.insert(
                    RemainingLimitRequest {
                        account,
                        key_id: auth.key_id,
                        token: limit.token,
                    },
                    limit.limit,
                );
            }
            state.keys.insert(
                (account, auth.key_id),
                GetKeyResponse {
                    signature_type: auth.key_type.into(),
                    key_id: auth.key_id,
                    expiry: auth.expiry,
                    enforce_limits: !auth.limits.is_empty(),
                    is_revoked: false,
                },
            );
        }

        for call in &signed.tx().calls {
            if call.to.to() != Some(&ACCOUNT_KEYCHAIN_ADDRESS) {
                continue;
            }
            if let Ok(revoke) = IAccountKeychain::revokeKeyCall::abi_decode(&call.input) {
                state.revoked.push(KeyRevokedEvent {
                    account,
                    key_id: revoke.keyId,
                    position,
                });
                if let Some(key) = state.keys.get_mut(&(account, revoke.keyId)) {
                    key.is_revoked = true;
                }
            }
        }
    }
}

#[async_trait]
impl KeychainLedger for FakeLedger {
    async fn latest_block(&self) -> Result<u64, LedgerError> {
        let delay = self.state.lock().latest_block_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(Query::LatestBlock)?;
        Ok(self.state.lock().latest_block)
    }

    async fn key_authorized_events(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<KeyAuthorizedEvent>, LedgerError> {
        self.record_range(Query::KeyAuthorized, range)?;
        Ok(self
            .state
            .lock()
            .authorized
            .iter()
            .filter(|event| event.account == account)
            .cloned()
            .collect())
    }

    async fn key_revoked_events(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<KeyRevokedEvent>, LedgerError> {
        self.record_range(Query::KeyRevoked, range)?;
        Ok(self
            .state
            .lock()
            .revoked
            .iter()
            .filter(|event| event.account == account)
            .cloned()
            .collect())
    }

    async fn spending_limit_events(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<SpendingLimitUpdatedEvent>, LedgerError> {
        self.record_range(Query::SpendingLimits, range)?;
        Ok(self
            .state
            .lock()
            .limits
            .iter()
            .filter(|event| event.account == account)
            .cloned()
            .collect())
    }

    async fn get_key(&self, request: GetKeyRequest) -> Result<GetKeyResponse, LedgerError> {
        self.record(Query::GetKey)?;
        Ok(self
            .state
            .lock()
            .keys
            .get(&(request.account, request.key_id))
            .copied()
            .unwrap_or_default())
    }

    async fn remaining_limit(
        &self,
        request: RemainingLimitRequest,
    ) -> Result<RemainingLimitResponse, LedgerError> {
        self.record(Query::RemainingLimit)?;
        self.lookup_remaining(request)
    }

    async fn legacy_spending_limit(
        &self,
        request: RemainingLimitRequest,
    ) -> Result<RemainingLimitResponse, LedgerError> {
        self.record(Query::LegacySpendingLimit)?;
        self.lookup_remaining(request)
    }

    async fn block_timestamp(&self, block: u64) -> Result<Option<u64>, LedgerError> {
        self.record(Query::BlockTimestamp)?;
        let delay = {
            let mut state = self.state.lock();
            state.timestamps_in_flight += 1;
            state.max_timestamps_in_flight =
                state.max_timestamps_in_flight.max(state.timestamps_in_flight);
            state.block_timestamp_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.timestamps_in_flight -= 1;
        Ok(state.timestamps.get(&block).copied())
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.record(Query::ChainId)?;
        Ok(CHAIN_ID)
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64, LedgerError> {
        self.record(Query::TransactionCount)?;
        Ok(self.state.lock().submitted.len() as u64)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError> {
        self.record(Query::FeeEstimate)?;
        Ok(FeeEstimate {
            max_fee_per_gas: 20_000_000_000,
            max_priority_fee_per_gas: 1,
        })
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<B256, LedgerError> {
        self.record(Query::SendRawTransaction)?;
        let signed = AASigned::decode_2718(&mut encoded.as_ref())
            .map_err(|_| LedgerError::Reverted("invalid transaction encoding"))?;

        let mut state = self.state.lock();
        if !state.revert_submissions {
            Self::apply(&mut state, &signed);
        }
        state.submitted.push(encoded.clone());
        Ok(keccak256(&encoded))
    }

    async fn wait_for_inclusion(
        &self,
        hash: B256,
        _timeout: Duration,
    ) -> Result<Inclusion, LedgerError> {
        self.record(Query::WaitForInclusion)?;
        let state = self.state.lock();
        Ok(Inclusion {
            transaction_hash: hash,
            block_number: state.latest_block,
            success: !state.revert_submissions,
        })
    }
}

impl FakeLedger {
    fn lookup_remaining(
        &self,
        request: RemainingLimitRequest,
    ) -> Result<RemainingLimitResponse, LedgerError> {
        self.state
            .lock()
            .remaining
            .get(&request)
            .map(|remaining| RemainingLimitResponse {
                remaining: *remaining,
            })
            .ok_or(LedgerError::Reverted("access key is not authorized for this account"))
    }
}
