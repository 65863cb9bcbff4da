use super::tempo_transaction::{P256_SIGNATURE_LENGTH, SECP256K1_SIGNATURE_LENGTH, SignatureType};
use alloy_primitives::{Address, B256, Bytes, Signature, keccak256};
use p256::{
    EncodedPoint,
    ecdsa::{Signature as P256Signature, VerifyingKey, signature::hazmat::PrehashVerifier},
};
use sha2::{Digest, Sha256};

/// Signature type identifiers
/// Note: Secp256k1 has no identifier - detected by length (65 bytes)
pub const SIGNATURE_TYPE_P256: u8 = 0x01;
pub const SIGNATURE_TYPE_WEBAUTHN: u8 = 0x02;
pub const SIGNATURE_TYPE_KEYCHAIN: u8 = 0x03;

/// Failure to verify a signature or recover its signer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecoveryError {
    #[error("secp256k1 recovery failed")]
    Secp256k1,
    #[error("invalid P256 public key")]
    InvalidP256PublicKey,
    #[error("invalid P256 signature encoding")]
    InvalidP256Signature,
    #[error("P256 signature verification failed")]
    P256Verification,
}

/// P256 signature with pre-hash flag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct P256SignatureWithPreHash {
    pub r: B256,
    pub s: B256,
    pub pub_key_x: B256,
    pub pub_key_y: B256,
    pub pre_hash: bool,
}

/// Signatures an access key can produce locally.
///
/// WebAuthn keys live in platform authenticators and never reach the local
/// vault, so only secp256k1 and P256 are represented here.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "camelCase"))]
pub enum PrimitiveSignature {
    /// Standard secp256k1 ECDSA signature (65 bytes: r, s, v)
    Secp256k1(Signature),

    /// P256 signature with embedded public key (129 bytes)
    P256(P256SignatureWithPreHash),
}

impl PrimitiveSignature {
    /// Parse signature from bytes.
    ///
    /// - 65 bytes: secp256k1 signature (no type identifier)
    /// - otherwise: first byte is the signature type identifier
    pub fn from_bytes(data: &[u8]) -> Result<Self, &'static str> {
        if data.is_empty() {
            return Err("Signature data is empty");
        }

        if data.len() == SECP256K1_SIGNATURE_LENGTH {
            let sig = Signature::try_from(data)
                .map_err(|_| "Failed to parse secp256k1 signature: invalid signature values")?;
            return Ok(Self::Secp256k1(sig));
        }

        if data.len() < 2 {
            return Err("Signature data too short: expected type identifier + signature data");
        }

        let (type_id, sig_data) = (data[0], &data[1..]);
        match type_id {
            SIGNATURE_TYPE_P256 => {
                if sig_data.len() != P256_SIGNATURE_LENGTH {
                    return Err("Invalid P256 signature length");
                }
                Ok(Self::P256(P256SignatureWithPreHash {
                    r: B256::from_slice(&sig_data[0..32]),
                    s: B256::from_slice(&sig_data[32..64]),
                    pub_key_x: B256::from_slice(&sig_data[64..96]),
                    pub_key_y: B256::from_slice(&sig_data[96..128]),
                    pre_hash: sig_data[128] != 0,
                }))
            }
            SIGNATURE_TYPE_WEBAUTHN => Err("WebAuthn signatures are not supported"),
            _ => Err("Unknown signature type identifier"),
        }
    }

    /// Encode signature to bytes
    ///
    /// - Secp256k1: encoded WITHOUT type identifier (65 bytes)
    /// - P256: encoded WITH type identifier prefix
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Secp256k1(sig) => Bytes::copy_from_slice(&sig.as_bytes()),
            Self::P256(p256_sig) => {
                let mut bytes = Vec::with_capacity(1 + P256_SIGNATURE_LENGTH);
                bytes.push(SIGNATURE_TYPE_P256);
                bytes.extend_from_slice(p256_sig.r.as_slice());
                bytes.extend_from_slice(p256_sig.s.as_slice());
                bytes.extend_from_slice(p256_sig.pub_key_x.as_slice());
                bytes.extend_from_slice(p256_sig.pub_key_y.as_slice());
                bytes.push(p256_sig.pre_hash as u8);
                Bytes::from(bytes)
            }
        }
    }

    pub fn encoded_length(&self) -> usize {
        match self {
            Self::Secp256k1(_) => SECP256K1_SIGNATURE_LENGTH,
            Self::P256(_) => 1 + P256_SIGNATURE_LENGTH,
        }
    }

    pub fn signature_type(&self) -> SignatureType {
        match self {
            Self::Secp256k1(_) => SignatureType::Secp256k1,
            Self::P256(_) => SignatureType::P256,
        }
    }

    /// Recover the signer address from the signature
    ///
    /// - secp256k1: ecrecover over the prehash
    /// - P256: verifies the signature, then derives the address from the embedded public key
    pub fn recover_signer(&self, sig_hash: &B256) -> Result<Address, RecoveryError> {
        match self {
            Self::Secp256k1(sig) => sig
                .recover_address_from_prehash(sig_hash)
                .map_err(|_| RecoveryError::Secp256k1),
            Self::P256(p256_sig) => {
                let message_hash = if p256_sig.pre_hash {
                    B256::from_slice(&Sha256::digest(sig_hash.as_slice()))
                } else {
                    *sig_hash
                };

                verify_p256_signature(
                    p256_sig.r.as_slice(),
                    p256_sig.s.as_slice(),
                    p256_sig.pub_key_x.as_slice(),
                    p256_sig.pub_key_y.as_slice(),
                    &message_hash,
                )?;

                Ok(derive_p256_address(&p256_sig.pub_key_x, &p256_sig.pub_key_y))
            }
        }
    }
}

impl alloy_rlp::Encodable for PrimitiveSignature {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        alloy_rlp::Encodable::encode(&self.to_bytes(), out);
    }

    fn length(&self) -> usize {
        self.to_bytes().length()
    }
}

impl alloy_rlp::Decodable for PrimitiveSignature {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let bytes: Bytes = alloy_rlp::Decodable::decode(buf)?;
        Self::from_bytes(&bytes).map_err(alloy_rlp::Error::Custom)
    }
}

/// Signature made by an access key on behalf of a root account.
///
/// Wire format: `0x03 || user_address (20 bytes) || inner signature`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct KeychainSignature {
    /// Root account address that this transaction is being executed for
    pub user_address: Address,
    /// The access key's own signature; never another keychain signature
    pub signature: PrimitiveSignature,
}

impl KeychainSignature {
    pub fn new(user_address: Address, signature: PrimitiveSignature) -> Self {
        Self {
            user_address,
            signature,
        }
    }

    /// Recovers the access key address that produced the inner signature.
    pub fn key_id(&self, sig_hash: &B256) -> Result<Address, RecoveryError> {
        self.signature.recover_signer(sig_hash)
    }
}

/// Transaction signature: either a root key signature or a keychain signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged, rename_all = "camelCase"))]
pub enum TempoSignature {
    Primitive(PrimitiveSignature),
    Keychain(KeychainSignature),
}

impl TempoSignature {
    pub fn from_bytes(data: &[u8]) -> Result<Self, &'static str> {
        if data.is_empty() {
            return Err("Signature data is empty");
        }

        if data.len() > 1
            && data.len() != SECP256K1_SIGNATURE_LENGTH
            && data[0] == SIGNATURE_TYPE_KEYCHAIN
        {
            let sig_data = &data[1..];
            if sig_data.len() < 20 {
                return Err("Invalid Keychain signature: too short for user_address");
            }

            let user_address = Address::from_slice(&sig_data[0..20]);
            let signature = PrimitiveSignature::from_bytes(&sig_data[20..])?;
            return Ok(Self::Keychain(KeychainSignature::new(user_address, signature)));
        }

        PrimitiveSignature::from_bytes(data).map(Self::Primitive)
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Primitive(primitive_sig) => primitive_sig.to_bytes(),
            Self::Keychain(keychain_sig) => {
                let inner_bytes = keychain_sig.signature.to_bytes();
                let mut bytes = Vec::with_capacity(1 + 20 + inner_bytes.len());
                bytes.push(SIGNATURE_TYPE_KEYCHAIN);
                bytes.extend_from_slice(keychain_sig.user_address.as_slice());
                bytes.extend_from_slice(&inner_bytes);
                Bytes::from(bytes)
            }
        }
    }

    pub fn encoded_length(&self) -> usize {
        match self {
            Self::Primitive(primitive_sig) => primitive_sig.encoded_length(),
            Self::Keychain(keychain_sig) => 1 + 20 + keychain_sig.signature.encoded_length(),
        }
    }

    pub fn signature_type(&self) -> SignatureType {
        match self {
            Self::Primitive(primitive_sig) => primitive_sig.signature_type(),
            Self::Keychain(keychain_sig) => keychain_sig.signature.signature_type(),
        }
    }

    /// Recover the account the transaction executes for.
    ///
    /// For keychain signatures the inner signature is verified and the root
    /// `user_address` is returned; the access key is available via
    /// [`KeychainSignature::key_id`].
    pub fn recover_signer(&self, sig_hash: &B256) -> Result<Address, RecoveryError> {
        match self {
            Self::Primitive(primitive_sig) => primitive_sig.recover_signer(sig_hash),
            Self::Keychain(keychain_sig) => {
                keychain_sig.key_id(sig_hash)?;
                Ok(keychain_sig.user_address)
            }
        }
    }

    pub fn as_keychain(&self) -> Option<&KeychainSignature> {
        match self {
            Self::Keychain(keychain_sig) => Some(keychain_sig),
            Self::Primitive(_) => None,
        }
    }
}

impl alloy_rlp::Encodable for TempoSignature {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        alloy_rlp::Encodable::encode(&self.to_bytes(), out);
    }

    fn length(&self) -> usize {
        self.to_bytes().length()
    }
}

impl From<Signature> for TempoSignature {
    fn from(signature: Signature) -> Self {
        Self::Primitive(PrimitiveSignature::Secp256k1(signature))
    }
}

/// Derives a P256 address from public key coordinates
pub fn derive_p256_address(pub_key_x: &B256, pub_key_y: &B256) -> Address {
    let hash = keccak256([pub_key_x.as_slice(), pub_key_y.as_slice()].concat());
    Address::from_slice(&hash[12..])
}

fn verify_p256_signature(
    r: &[u8],
    s: &[u8],
    pub_key_x: &[u8],
    pub_key_y: &[u8],
    message_hash: &B256,
) -> Result<(), RecoveryError> {
    let encoded_point =
        EncodedPoint::from_affine_coordinates(pub_key_x.into(), pub_key_y.into(), false);

    let verifying_key = VerifyingKey::from_encoded_point(&encoded_point)
        .map_err(|_| RecoveryError::InvalidP256PublicKey)?;

    let signature = P256Signature::from_slice(&[r, s].concat())
        .map_err(|_| RecoveryError::InvalidP256Signature)?;

    verifying_key
        .verify_prehash(message_hash.as_slice(), &signature)
        .map_err(|_| RecoveryError::P256Verification)
}
