//! Wire types for Tempo access-key transactions.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod transaction;

pub use transaction::{
    AASigned, Call, KeyAuthorization, KeychainSignature, PrimitiveSignature, SignatureType,
    SignedKeyAuthorization, TEMPO_TX_TYPE_ID, TempoSignature, TempoTransaction, TokenLimit,
};
