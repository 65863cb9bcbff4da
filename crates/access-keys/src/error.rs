use alloy::{
    primitives::{Address, B256},
    transports::TransportError,
};
use tempo_primitives::SignatureType;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("rpc request failed")]
    Transport(#[from] TransportError),
    #[error("keychain call reverted: {0}")]
    Reverted(&'static str),
    #[error("contract call failed")]
    Contract(#[source] alloy::contract::Error),
    #[error("log {what} at block {block} could not be decoded")]
    UndecodableLog {
        what: &'static str,
        block: u64,
        #[source]
        source: alloy::sol_types::Error,
    },
    #[error("transaction `{0}` was not included before the timeout")]
    InclusionTimeout(B256),
    #[error("transaction `{hash}` reverted in block {block}")]
    TransactionReverted { hash: B256, block: u64 },
}

impl LedgerError {
    /// Whether repeating the request may succeed without any change on our side.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Contract(_) | Self::InclusionTimeout(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyMaterialError {
    #[error("private key is neither a P-256 nor a secp256k1 PKCS#8 document")]
    UnsupportedAlgorithm,
    #[error("failed encoding private key as PKCS#8")]
    Encode(#[source] p256::pkcs8::Error),
    #[error("{0} keys cannot be generated or held locally")]
    UnsupportedKeyType(SignatureType),
    #[error("P-256 signing failed")]
    P256Signing(#[source] p256::ecdsa::Error),
    #[error("secp256k1 signing failed")]
    Secp256k1Signing(#[source] alloy::signers::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("access key `{0}` was not found on this device and cannot be used here")]
    NotFound(Address),
    #[error("failed reading key store `{path}`")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed writing key store `{path}`")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key store contents are not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("stored private key is not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("stored private key is unusable")]
    Material(#[from] KeyMaterialError),
}

/// Stage a key creation had reached when it failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreationState {
    Idle,
    KeypairStored,
    AuthorizationSigned,
    Submitted,
    Confirmed,
    Failed,
}

impl std::fmt::Display for CreationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::KeypairStored => "keypair stored",
            Self::AuthorizationSigned => "authorization signed",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    KeyMaterial(#[from] KeyMaterialError),
    #[error("ledger interaction failed")]
    Ledger(#[from] LedgerError),
    #[error("vault entry derives key `{derived}`, expected `{expected}`")]
    KeyMismatch { expected: Address, derived: Address },
    #[error("root key `{root}` does not control account `{account}`")]
    RootMismatch { account: Address, root: Address },
    #[error("access key `{0}` is not authorized for this account")]
    KeyNotAuthorized(Address),
    #[error("access key `{0}` has been revoked")]
    KeyRevoked(Address),
    #[error("access key `{key_id}` expired at {expiry}")]
    KeyExpired { key_id: Address, expiry: u64 },
    #[error("signing failed")]
    Signing(#[source] alloy::signers::Error),
    #[error("refusing to submit an invalid transaction: {0}")]
    InvalidTransaction(&'static str),
    #[error("key creation failed after reaching state `{state}`")]
    Creation {
        state: CreationState,
        #[source]
        source: Box<SignerError>,
    },
}

impl SignerError {
    /// Whether the same operation can be attempted again.
    ///
    /// Missing key material and key status failures are final on this device.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Ledger(error) => error.is_transient(),
            Self::Creation { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns the vault miss behind this error, if any.
    pub fn as_vault_miss(&self) -> Option<Address> {
        match self {
            Self::Vault(VaultError::NotFound(key_id)) => Some(*key_id),
            Self::Creation { source, .. } => source.as_vault_miss(),
            _ => None,
        }
    }
}
