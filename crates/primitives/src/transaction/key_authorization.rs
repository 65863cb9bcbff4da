use super::{PrimitiveSignature, RecoveryError, SignatureType};
use alloy_primitives::{Address, B256, U256, keccak256};
use alloy_rlp::{BufMut, Decodable, Encodable, encode_list, list_length};

/// Per-token spending limit attached to an access key.
///
/// Enforced by the AccountKeychain precompile over the key's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, alloy_rlp::RlpEncodable, alloy_rlp::RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TokenLimit {
    /// TIP20 token address
    pub token: Address,

    /// Maximum amount the key may ever spend of this token
    pub limit: U256,
}

/// Unsigned authorization of an access key by a root account.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct KeyAuthorization {
    /// Chain ID for replay protection (0 = valid on any chain)
    pub chain_id: u64,

    /// Curve of the key being authorized
    pub key_type: SignatureType,

    /// Address derived from the access key's public key
    pub key_id: Address,

    /// Unix timestamp when the key expires (0 = never expires)
    pub expiry: u64,

    /// TIP20 spending limits; empty means the key is unrestricted
    pub limits: Vec<TokenLimit>,
}

impl KeyAuthorization {
    /// Hash the root key signs: `keccak256(rlp([chain_id, key_type, key_id, expiry, limits]))`.
    pub fn signature_hash(&self) -> B256 {
        let key_type: u8 = self.key_type.into();
        let payload_length = self.chain_id.length()
            + key_type.length()
            + self.key_id.length()
            + self.expiry.length()
            + list_length(&self.limits);

        let mut buf = Vec::with_capacity(payload_length + 4);
        alloy_rlp::Header {
            list: true,
            payload_length,
        }
        .encode(&mut buf);
        self.chain_id.encode(&mut buf);
        key_type.encode(&mut buf);
        self.key_id.encode(&mut buf);
        self.expiry.encode(&mut buf);
        encode_list(&self.limits, &mut buf);

        keccak256(&buf)
    }

    pub fn into_signed(self, signature: PrimitiveSignature) -> SignedKeyAuthorization {
        SignedKeyAuthorization {
            authorization: self,
            signature,
        }
    }
}

/// A [`KeyAuthorization`] together with the root key's signature over it.
///
/// Wire layout: `rlp([chain_id, key_type, expiry, limits, key_id, signature])`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SignedKeyAuthorization {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub authorization: KeyAuthorization,

    /// Root key signature over [`KeyAuthorization::signature_hash`]
    pub signature: PrimitiveSignature,
}

impl SignedKeyAuthorization {
    /// Recovers the root account that signed the authorization.
    pub fn recover_signer(&self) -> Result<Address, RecoveryError> {
        self.signature
            .recover_signer(&self.authorization.signature_hash())
    }

    fn payload_length(&self) -> usize {
        let auth = &self.authorization;
        auth.chain_id.length()
            + auth.key_type.length()
            + auth.expiry.length()
            + list_length(&auth.limits)
            + auth.key_id.length()
            + self.signature.length()
    }
}

impl Encodable for SignedKeyAuthorization {
    fn encode(&self, out: &mut dyn BufMut) {
        let auth = &self.authorization;
        alloy_rlp::Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        auth.chain_id.encode(out);
        auth.key_type.encode(out);
        auth.expiry.encode(out);
        encode_list(&auth.limits, out);
        auth.key_id.encode(out);
        self.signature.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        alloy_rlp::length_of_length(payload_length) + payload_length
    }
}

impl Decodable for SignedKeyAuthorization {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let remaining = buf.len();
        if header.payload_length > remaining {
            return Err(alloy_rlp::Error::InputTooShort);
        }

        let chain_id = Decodable::decode(buf)?;
        let key_type = Decodable::decode(buf)?;
        let expiry = Decodable::decode(buf)?;
        let limits = Decodable::decode(buf)?;
        let key_id = Decodable::decode(buf)?;
        let signature = Decodable::decode(buf)?;

        if buf.len() + header.payload_length != remaining {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }

        Ok(Self {
            authorization: KeyAuthorization {
                chain_id,
                key_type,
                key_id,
                expiry,
                limits,
            },
            signature,
        })
    }
}
