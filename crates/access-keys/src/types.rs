use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tempo_primitives::SignatureType;

/// An access key the ledger currently considers valid for an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    /// Address derived from the key's public key.
    pub key_id: Address,
    pub signature_type: SignatureType,
    /// Unix seconds; `0` never expires.
    pub expiry: u64,
    /// Block of the authorizing event.
    pub block_number: u64,
    /// Timestamp of `block_number`, if it could be resolved.
    pub created_at: Option<u64>,
    pub enforce_limits: bool,
    /// Remaining amount per token. Tokens whose remaining amount is exhausted
    /// or could not be read are absent.
    pub spending_limits: BTreeMap<Address, U256>,
    /// Limit per token as first recorded for this key.
    pub original_limits: BTreeMap<Address, U256>,
}

impl AccessKey {
    pub fn is_expired(&self, now: u64) -> bool {
        is_expired(self.expiry, now)
    }
}

pub(crate) fn is_expired(expiry: u64, now: u64) -> bool {
    expiry != 0 && expiry <= now
}

/// Current wall clock time in unix seconds.
pub(crate) fn unix_now() -> u64 {
    u64::try_from(jiff::Timestamp::now().as_second()).unwrap_or_default()
}

/// A key this process has submitted but not yet seen on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingKey {
    pub key_id: Address,
    pub expiry: u64,
    pub token_address: Option<Address>,
    pub spending_limit: Option<U256>,
}

/// One entry of the merged key list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum KeyView {
    Confirmed { key: AccessKey, revoking: bool },
    Pending(PendingKey),
}

impl KeyView {
    pub fn key_id(&self) -> Address {
        match self {
            Self::Confirmed { key, .. } => key.key_id,
            Self::Pending(pending) => pending.key_id,
        }
    }
}

/// Immutable state published after each successful poll.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySnapshot {
    pub account: Address,
    /// Number of polls published by the subscription; `0` before the first poll.
    pub generation: u64,
    /// Latest block at the time of the poll.
    pub block: u64,
    pub keys: Vec<AccessKey>,
    pub pending: Vec<PendingKey>,
    pub revoking: BTreeSet<Address>,
    /// At least one of the event queries failed during this poll.
    pub degraded: bool,
}

impl KeySnapshot {
    pub(crate) fn empty(account: Address) -> Self {
        Self {
            account,
            ..Default::default()
        }
    }

    pub fn key(&self, key_id: Address) -> Option<&AccessKey> {
        self.keys.iter().find(|key| key.key_id == key_id)
    }

    /// Pending keys first (newest first), then confirmed keys.
    pub fn views(&self) -> Vec<KeyView> {
        crate::overlay::merge_views(&self.pending, &self.revoking, &self.keys)
    }
}
