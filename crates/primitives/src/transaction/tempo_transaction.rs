use super::{SignedKeyAuthorization, TempoSignature, tt_signed::AASigned};
use alloy_eips::eip2930::AccessList;
use alloy_primitives::{Address, B256, Bytes, ChainId, TxKind, U256, keccak256};
use alloy_rlp::{BufMut, Decodable, EMPTY_LIST_CODE, EMPTY_STRING_CODE, Encodable};

/// Tempo transaction type
pub const TEMPO_TX_TYPE_ID: u8 = 0x76;

/// Signature length constants
pub const SECP256K1_SIGNATURE_LENGTH: usize = 65;
pub const P256_SIGNATURE_LENGTH: usize = 129;

/// Signature type enumeration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
#[repr(u8)]
pub enum SignatureType {
    Secp256k1 = 0,
    P256 = 1,
    WebAuthn = 2,
}

impl From<SignatureType> for u8 {
    fn from(sig_type: SignatureType) -> Self {
        sig_type as Self
    }
}

impl TryFrom<u8> for SignatureType {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Secp256k1),
            1 => Ok(Self::P256),
            2 => Ok(Self::WebAuthn),
            other => Err(other),
        }
    }
}

impl core::fmt::Display for SignatureType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Secp256k1 => "secp256k1",
            Self::P256 => "p256",
            Self::WebAuthn => "webauthn",
        })
    }
}

impl core::str::FromStr for SignatureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secp256k1" => Ok(Self::Secp256k1),
            "p256" => Ok(Self::P256),
            "webauthn" => Ok(Self::WebAuthn),
            other => Err(format!("unknown signature type `{other}`")),
        }
    }
}

impl Encodable for SignatureType {
    fn encode(&self, out: &mut dyn BufMut) {
        (*self as u8).encode(out);
    }

    fn length(&self) -> usize {
        1
    }
}

impl Decodable for SignatureType {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let byte: u8 = Decodable::decode(buf)?;
        Self::try_from(byte).map_err(|_| alloy_rlp::Error::Custom("Invalid signature type"))
    }
}

#[inline]
fn rlp_header(payload_length: usize) -> alloy_rlp::Header {
    alloy_rlp::Header {
        list: true,
        payload_length,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Call {
    /// Call target.
    pub to: TxKind,

    /// Call value.
    pub value: U256,

    /// Call input.
    pub input: Bytes,
}

impl Call {
    #[inline]
    fn rlp_header(&self) -> alloy_rlp::Header {
        rlp_header(self.to.length() + self.value.length() + self.input.length())
    }
}

impl Encodable for Call {
    fn encode(&self, out: &mut dyn BufMut) {
        self.rlp_header().encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.encode(out);
    }

    fn length(&self) -> usize {
        self.rlp_header().length_with_payload()
    }
}

impl Decodable for Call {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let remaining = buf.len();

        if header.payload_length > remaining {
            return Err(alloy_rlp::Error::InputTooShort);
        }

        let this = Self {
            to: Decodable::decode(buf)?,
            value: Decodable::decode(buf)?,
            input: Decodable::decode(buf)?,
        };

        if buf.len() + header.payload_length != remaining {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }

        Ok(this)
    }
}

/// Tempo transaction as produced by access-key tooling.
///
/// Fee sponsorship and EIP-7702 style authorization lists are never set by
/// this crate; their wire positions are always encoded empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TempoTransaction {
    /// EIP-155: Simple replay attack protection
    pub chain_id: ChainId,

    /// Fee token the sender pays gas in
    pub fee_token: Option<Address>,

    /// Max Priority fee per gas (EIP-1559)
    pub max_priority_fee_per_gas: u128,

    /// Max fee per gas (EIP-1559)
    pub max_fee_per_gas: u128,

    /// Gas limit
    pub gas_limit: u64,

    /// Calls to be executed atomically
    pub calls: Vec<Call>,

    /// Access list (EIP-2930)
    pub access_list: AccessList,

    /// Nonce key for 2D nonce system; key 0 is the protocol nonce
    pub nonce_key: U256,

    /// Current nonce value for the nonce key
    pub nonce: u64,

    /// Transaction can only be included in a block before this timestamp
    pub valid_before: Option<u64>,

    /// Transaction can only be included in a block after this timestamp
    pub valid_after: Option<u64>,

    /// Root-signed authorization provisioning a new access key before the
    /// transaction signature is verified.
    pub key_authorization: Option<SignedKeyAuthorization>,
}

impl TempoTransaction {
    #[doc(alias = "transaction_type")]
    pub const fn tx_type() -> u8 {
        TEMPO_TX_TYPE_ID
    }

    /// Checks the structural rules the pool enforces on every Tempo transaction.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.calls.is_empty() {
            return Err("calls list cannot be empty");
        }

        if self.calls.iter().skip(1).any(|call| call.to.is_create()) {
            return Err(
                "only one CREATE call is allowed per transaction, and it must be the first call of the batch",
            );
        }

        if let Some(valid_after) = self.valid_after
            && let Some(valid_before) = self.valid_before
            && valid_before <= valid_after
        {
            return Err("valid_before must be greater than valid_after");
        }

        Ok(())
    }

    pub fn into_signed(self, signature: TempoSignature) -> AASigned {
        AASigned::new(self, signature)
    }

    /// The hash signed by the sender (root key or access key).
    pub fn signature_hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(1 + self.fields_header().length_with_payload());
        buf.put_u8(Self::tx_type());
        self.fields_header().encode(&mut buf);
        self.rlp_encode_fields(&mut buf);
        keccak256(&buf)
    }

    pub(crate) fn fields_header(&self) -> alloy_rlp::Header {
        rlp_header(self.rlp_encoded_fields_length())
    }

    /// Length of the transaction's fields, without a RLP header.
    pub(crate) fn rlp_encoded_fields_length(&self) -> usize {
        self.chain_id.length()
            + self.max_priority_fee_per_gas.length()
            + self.max_fee_per_gas.length()
            + self.gas_limit.length()
            + self.calls.length()
            + self.access_list.length()
            + self.nonce_key.length()
            + self.nonce.length()
            + self.valid_before.map_or(1, |v| v.length())
            + self.valid_after.map_or(1, |v| v.length())
            + self.fee_token.map_or(1, |addr| addr.length())
            // fee_payer_signature
            + 1
            // aa_authorization_list
            + 1
            + self.key_authorization.as_ref().map_or(0, |auth| auth.length())
    }

    pub(crate) fn rlp_encode_fields(&self, out: &mut dyn BufMut) {
        self.chain_id.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        self.calls.encode(out);
        self.access_list.encode(out);
        self.nonce_key.encode(out);
        self.nonce.encode(out);

        match self.valid_before {
            Some(valid_before) => valid_before.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }

        match self.valid_after {
            Some(valid_after) => valid_after.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }

        match self.fee_token {
            Some(addr) => addr.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }

        out.put_u8(EMPTY_STRING_CODE);
        out.put_u8(EMPTY_LIST_CODE);

        // Only encoded if present
        if let Some(key_auth) = &self.key_authorization {
            key_auth.encode(out);
        }
    }

    /// Decodes the fields of a transaction whose list header was already consumed.
    ///
    /// The key authorization is the only list that may follow the fixed fields;
    /// a signature, when present, is always an RLP string.
    pub(crate) fn rlp_decode_fields(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let chain_id = Decodable::decode(buf)?;
        let max_priority_fee_per_gas = Decodable::decode(buf)?;
        let max_fee_per_gas = Decodable::decode(buf)?;
        let gas_limit = Decodable::decode(buf)?;
        let calls = Decodable::decode(buf)?;
        let access_list = Decodable::decode(buf)?;
        let nonce_key = Decodable::decode(buf)?;
        let nonce = Decodable::decode(buf)?;
        let valid_before = decode_optional(buf)?;
        let valid_after = decode_optional(buf)?;
        let fee_token = decode_optional(buf)?;

        if buf.first() != Some(&EMPTY_STRING_CODE) {
            return Err(alloy_rlp::Error::Custom("fee payer signatures are not supported"));
        }
        *buf = &buf[1..];

        if buf.first() != Some(&EMPTY_LIST_CODE) {
            return Err(alloy_rlp::Error::Custom("authorization lists are not supported"));
        }
        *buf = &buf[1..];

        let key_authorization = if buf.first().is_some_and(|b| *b >= EMPTY_LIST_CODE) {
            Some(Decodable::decode(buf)?)
        } else {
            None
        };

        Ok(Self {
            chain_id,
            fee_token,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit,
            calls,
            access_list,
            nonce_key,
            nonce,
            valid_before,
            valid_after,
            key_authorization,
        })
    }
}

fn decode_optional<T: Decodable>(buf: &mut &[u8]) -> alloy_rlp::Result<Option<T>> {
    if buf.first() == Some(&EMPTY_STRING_CODE) {
        *buf = &buf[1..];
        Ok(None)
    } else {
        Decodable::decode(buf).map(Some)
    }
}

impl Encodable for TempoTransaction {
    fn encode(&self, out: &mut dyn BufMut) {
        self.fields_header().encode(out);
        self.rlp_encode_fields(out);
    }

    fn length(&self) -> usize {
        self.fields_header().length_with_payload()
    }
}

impl Decodable for TempoTransaction {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        if header.payload_length > buf.len() {
            return Err(alloy_rlp::Error::InputTooShort);
        }

        let mut fields_buf = &buf[..header.payload_length];
        let this = Self::rlp_decode_fields(&mut fields_buf)?;

        if !fields_buf.is_empty() {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }
        *buf = &buf[header.payload_length..];

        Ok(this)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{KeyAuthorization, PrimitiveSignature, TokenLimit};
    use alloy_primitives::{Signature, address, bytes};

    fn transfer_tx() -> TempoTransaction {
        TempoTransaction {
            chain_id: 42431,
            fee_token: Some(address!("0x20C0000000000000000000000000000000000000")),
            max_priority_fee_per_gas: 1,
            max_fee_per_gas: 20_000_000_000,
            gas_limit: 300_000,
            calls: vec![Call {
                to: TxKind::Call(address!("0x20C0000000000000000000000000000000000001")),
                value: U256::ZERO,
                input: bytes!("a9059cbb"),
            }],
            nonce: 3,
            valid_before: Some(u64::MAX),
            ..Default::default()
        }
    }

    #[test]
    fn signature_hash_is_prefixed_with_tx_type() {
        let tx = transfer_tx();
        let mut expected = vec![TEMPO_TX_TYPE_ID];
        tx.encode(&mut expected);
        assert_eq!(tx.signature_hash(), keccak256(&expected));
    }

    #[test]
    fn rlp_roundtrip_with_key_authorization() {
        let mut tx = transfer_tx();
        tx.key_authorization = Some(
            KeyAuthorization {
                chain_id: 0,
                key_type: SignatureType::P256,
                key_id: Address::repeat_byte(0xbb),
                expiry: 0,
                limits: vec![TokenLimit {
                    token: Address::repeat_byte(0xcc),
                    limit: U256::from(1000),
                }],
            }
            .into_signed(PrimitiveSignature::Secp256k1(Signature::test_signature())),
        );

        let encoded = alloy_rlp::encode(&tx);
        assert_eq!(encoded.len(), tx.length());
        let decoded = TempoTransaction::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, tx);

        // The authorization is part of what the sender signs.
        let mut without = tx.clone();
        without.key_authorization = None;
        assert_ne!(without.signature_hash(), tx.signature_hash());
    }

    #[test]
    fn validate_rejects_empty_calls_and_bad_windows() {
        let mut tx = transfer_tx();
        assert!(tx.validate().is_ok());

        tx.valid_after = Some(10);
        tx.valid_before = Some(10);
        assert_eq!(
            tx.validate(),
            Err("valid_before must be greater than valid_after")
        );

        tx.calls.clear();
        assert_eq!(tx.validate(), Err("calls list cannot be empty"));
    }

    #[test]
    fn signature_type_parsing() {
        assert_eq!("P256".parse::<SignatureType>(), Ok(SignatureType::P256));
        assert_eq!(SignatureType::try_from(2u8), Ok(SignatureType::WebAuthn));
        assert_eq!(SignatureType::try_from(7u8), Err(7));
        assert_eq!(SignatureType::Secp256k1.to_string(), "secp256k1");
    }
}
