//! The narrow interface through which every network interaction passes.

use crate::error::LedgerError;
use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use std::time::Duration;

mod rpc;
pub use rpc::RpcLedger;

/// Inclusive block range of a log query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// The range of at most `window` blocks ending at `latest`.
    pub fn ending_at(latest: u64, window: u64) -> Self {
        Self {
            from: latest.saturating_sub(window),
            to: latest,
        }
    }
}

/// Position of a log in the chain, ordering events in emission order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyAuthorizedEvent {
    pub account: Address,
    pub key_id: Address,
    /// Raw signature type byte; unknown values are rejected during reconciliation.
    pub signature_type: u8,
    pub expiry: u64,
    pub position: LogPosition,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRevokedEvent {
    pub account: Address,
    pub key_id: Address,
    pub position: LogPosition,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendingLimitUpdatedEvent {
    pub account: Address,
    pub key_id: Address,
    pub token: Address,
    pub new_limit: U256,
    pub position: LogPosition,
}

/// Arguments of `getKey`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GetKeyRequest {
    pub account: Address,
    pub key_id: Address,
}

/// Result of `getKey`. A key that was never authorized has a zero `key_id`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetKeyResponse {
    pub signature_type: u8,
    pub key_id: Address,
    pub expiry: u64,
    pub enforce_limits: bool,
    pub is_revoked: bool,
}

impl GetKeyResponse {
    pub fn exists(&self) -> bool {
        !self.key_id.is_zero()
    }
}

/// Arguments of `getRemainingLimit` and of the legacy `spendingLimit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RemainingLimitRequest {
    pub account: Address,
    pub key_id: Address,
    pub token: Address,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemainingLimitResponse {
    pub remaining: U256,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Receipt of an included transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inclusion {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub success: bool,
}

#[async_trait]
pub trait KeychainLedger: Send + Sync + 'static {
    async fn latest_block(&self) -> Result<u64, LedgerError>;

    async fn key_authorized_events(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<KeyAuthorizedEvent>, LedgerError>;

    async fn key_revoked_events(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<KeyRevokedEvent>, LedgerError>;

    async fn spending_limit_events(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<SpendingLimitUpdatedEvent>, LedgerError>;

    async fn get_key(&self, request: GetKeyRequest) -> Result<GetKeyResponse, LedgerError>;

    async fn remaining_limit(
        &self,
        request: RemainingLimitRequest,
    ) -> Result<RemainingLimitResponse, LedgerError>;

    async fn legacy_spending_limit(
        &self,
        request: RemainingLimitRequest,
    ) -> Result<RemainingLimitResponse, LedgerError>;

    /// Timestamp of `block`, or `None` if the ledger does not know the block.
    async fn block_timestamp(&self, block: u64) -> Result<Option<u64>, LedgerError>;

    async fn chain_id(&self) -> Result<u64, LedgerError>;

    /// Next protocol nonce of `address`, counting pending transactions.
    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError>;

    async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError>;

    /// Submits an EIP-2718 encoded transaction and returns its hash.
    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<B256, LedgerError>;

    async fn wait_for_inclusion(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<Inclusion, LedgerError>;
}
