//! Private key material of access keys held on this device.

use crate::error::KeyMaterialError;
use alloy::{
    primitives::{Address, B256},
    signers::{SignerSync as _, local::PrivateKeySigner},
};
use p256::{
    ecdsa::{
        Signature as P256Signature, SigningKey as P256SigningKey, signature::hazmat::PrehashSigner,
    },
    elliptic_curve::rand_core::OsRng,
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
};
use sha2::{Digest, Sha256};
use tempo_primitives::{
    SignatureType,
    transaction::{P256SignatureWithPreHash, PrimitiveSignature, derive_p256_address},
};

/// A locally generated access key.
///
/// WebAuthn keys live in platform authenticators and are never represented here.
#[derive(Clone)]
pub enum AccessKeyMaterial {
    Secp256k1(PrivateKeySigner),
    P256(P256SigningKey),
}

impl std::fmt::Debug for AccessKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKeyMaterial")
            .field("key_type", &self.key_type())
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

impl AccessKeyMaterial {
    pub fn generate(key_type: SignatureType) -> Result<Self, KeyMaterialError> {
        match key_type {
            SignatureType::Secp256k1 => Ok(Self::Secp256k1(PrivateKeySigner::random())),
            SignatureType::P256 => Ok(Self::P256(P256SigningKey::random(&mut OsRng))),
            SignatureType::WebAuthn => Err(KeyMaterialError::UnsupportedKeyType(key_type)),
        }
    }

    /// Imports a PKCS#8 DER document, taking the curve from its algorithm identifier.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, KeyMaterialError> {
        if let Ok(key) = P256SigningKey::from_pkcs8_der(der) {
            return Ok(Self::P256(key));
        }
        if let Ok(key) = k256::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(Self::Secp256k1(PrivateKeySigner::from_signing_key(key)));
        }
        Err(KeyMaterialError::UnsupportedAlgorithm)
    }

    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, KeyMaterialError> {
        let document = match self {
            Self::Secp256k1(signer) => signer.credential().to_pkcs8_der(),
            Self::P256(key) => key.to_pkcs8_der(),
        }
        .map_err(KeyMaterialError::Encode)?;
        Ok(document.as_bytes().to_vec())
    }

    pub fn key_type(&self) -> SignatureType {
        match self {
            Self::Secp256k1(_) => SignatureType::Secp256k1,
            Self::P256(_) => SignatureType::P256,
        }
    }

    /// Address the keychain identifies this key by.
    pub fn key_id(&self) -> Address {
        match self {
            Self::Secp256k1(signer) => signer.address(),
            Self::P256(key) => {
                let (x, y) = p256_coordinates(key);
                derive_p256_address(&x, &y)
            }
        }
    }

    /// Signs a transaction or authorization hash.
    ///
    /// P256 keys sign `sha256(hash)` with the `pre_hash` flag set and a low-S
    /// normalized signature.
    pub fn sign_hash(&self, hash: &B256) -> Result<PrimitiveSignature, KeyMaterialError> {
        match self {
            Self::Secp256k1(signer) => signer
                .sign_hash_sync(hash)
                .map(PrimitiveSignature::Secp256k1)
                .map_err(KeyMaterialError::Secp256k1Signing),
            Self::P256(key) => {
                let pre_hashed = Sha256::digest(hash);
                let signature: P256Signature =
                    key.sign_prehash(&pre_hashed).map_err(KeyMaterialError::P256Signing)?;
                let signature = signature.normalize_s().unwrap_or(signature);
                let bytes = signature.to_bytes();
                let (pub_key_x, pub_key_y) = p256_coordinates(key);

                Ok(PrimitiveSignature::P256(P256SignatureWithPreHash {
                    r: B256::from_slice(&bytes[..32]),
                    s: B256::from_slice(&bytes[32..]),
                    pub_key_x,
                    pub_key_y,
                    pre_hash: true,
                }))
            }
        }
    }
}

fn p256_coordinates(key: &P256SigningKey) -> (B256, B256) {
    let point = key.verifying_key().to_encoded_point(false);
    // Uncompressed points of a valid verifying key always carry both coordinates.
    let coordinate =
        |c: Option<&p256::FieldBytes>| c.map(|c| B256::from_slice(c)).unwrap_or_default();
    (coordinate(point.x()), coordinate(point.y()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    #[test]
    fn pkcs8_roundtrip_preserves_key_id() {
        for key_type in [SignatureType::P256, SignatureType::Secp256k1] {
            let material = AccessKeyMaterial::generate(key_type).unwrap();
            let der = material.to_pkcs8_der().unwrap();
            let imported = AccessKeyMaterial::from_pkcs8_der(&der).unwrap();

            assert_eq!(imported.key_type(), key_type);
            assert_eq!(imported.key_id(), material.key_id());
        }
    }

    #[test]
    fn signatures_recover_to_key_id() {
        let hash = keccak256(b"access key");
        for key_type in [SignatureType::P256, SignatureType::Secp256k1] {
            let material = AccessKeyMaterial::generate(key_type).unwrap();
            let signature = material.sign_hash(&hash).unwrap();

            assert_eq!(signature.signature_type(), key_type);
            assert_eq!(signature.recover_signer(&hash).unwrap(), material.key_id());
        }
    }

    #[test]
    fn webauthn_and_garbage_are_rejected() {
        assert!(matches!(
            AccessKeyMaterial::generate(SignatureType::WebAuthn),
            Err(KeyMaterialError::UnsupportedKeyType(SignatureType::WebAuthn))
        ));
        assert!(matches!(
            AccessKeyMaterial::from_pkcs8_der(b"not a key"),
            Err(KeyMaterialError::UnsupportedAlgorithm)
        ));
    }
}
