//! Access key management for Tempo accounts.
//!
//! [`KeychainService`] reconstructs the set of access keys an account has
//! authorized from AccountKeychain events, enriches them with remaining
//! spending limits and creation times, and publishes [`KeySnapshot`]s.
//! [`DelegatedSigner`] creates, uses, and revokes keys whose private half is
//! kept in a local [`KeyVault`].

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod keys;
pub mod ledger;
pub mod log_reader;
pub mod oracle;
pub mod overlay;
pub mod reconciler;
pub mod signer;
pub mod subscription;
pub mod timestamps;
pub mod types;
pub mod vault;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{CreationState, KeyMaterialError, LedgerError, SignerError, VaultError};
pub use keys::AccessKeyMaterial;
pub use ledger::{KeychainLedger, RpcLedger};
pub use oracle::{LimitAbi, OracleConfig};
pub use overlay::{Overlay, SharedOverlay};
pub use reconciler::Reconciler;
pub use signer::{CreateKeyRequest, CreatedKey, DelegatedSigner, SignerConfig};
pub use subscription::{KeychainService, Subscription, SubscriptionConfig};
pub use types::{AccessKey, KeySnapshot, KeyView, PendingKey};
pub use vault::{FileKeyStore, KeyStore, KeyVault, MemoryKeyStore};
