pub mod key_authorization;
pub mod tempo_transaction;
pub mod tt_signature;
pub mod tt_signed;

pub use key_authorization::{KeyAuthorization, SignedKeyAuthorization, TokenLimit};
pub use tempo_transaction::{
    Call, P256_SIGNATURE_LENGTH, SECP256K1_SIGNATURE_LENGTH, SignatureType, TEMPO_TX_TYPE_ID,
    TempoTransaction,
};
pub use tt_signature::{
    KeychainSignature, P256SignatureWithPreHash, PrimitiveSignature, RecoveryError,
    SIGNATURE_TYPE_KEYCHAIN, SIGNATURE_TYPE_P256, SIGNATURE_TYPE_WEBAUTHN, TempoSignature,
    derive_p256_address,
};
pub use tt_signed::AASigned;
