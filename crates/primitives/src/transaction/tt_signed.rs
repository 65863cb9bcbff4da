use super::{
    tempo_transaction::{TEMPO_TX_TYPE_ID, TempoTransaction},
    tt_signature::{RecoveryError, TempoSignature},
};
use alloy_eips::{
    Decodable2718, Encodable2718, Typed2718,
    eip2718::{Eip2718Error, Eip2718Result},
};
use alloy_primitives::{Address, B256, Bytes, keccak256};
use alloy_rlp::{BufMut, Decodable, Encodable};
use std::sync::OnceLock;

/// A Tempo transaction sealed with its signature.
///
/// The transaction hash is computed lazily from the EIP-2718 encoding and cached.
#[derive(Clone, Debug)]
pub struct AASigned {
    tx: TempoTransaction,
    signature: TempoSignature,
    #[doc(alias = "tx_hash", alias = "transaction_hash")]
    hash: OnceLock<B256>,
}

impl AASigned {
    /// Does not verify the signature.
    pub const fn new(tx: TempoTransaction, signature: TempoSignature) -> Self {
        Self {
            tx,
            signature,
            hash: OnceLock::new(),
        }
    }

    #[doc(alias = "transaction")]
    pub const fn tx(&self) -> &TempoTransaction {
        &self.tx
    }

    pub const fn signature(&self) -> &TempoSignature {
        &self.signature
    }

    /// Returns the transaction hash, computing it on first access.
    #[doc(alias = "tx_hash", alias = "transaction_hash")]
    pub fn hash(&self) -> &B256 {
        self.hash.get_or_init(|| keccak256(self.encoded_2718()))
    }

    pub fn signature_hash(&self) -> B256 {
        self.tx.signature_hash()
    }

    /// Recovers the account the transaction executes for.
    pub fn recover_signer(&self) -> Result<Address, RecoveryError> {
        self.signature.recover_signer(&self.signature_hash())
    }

    #[inline]
    fn rlp_header(&self) -> alloy_rlp::Header {
        alloy_rlp::Header {
            list: true,
            payload_length: self.tx.rlp_encoded_fields_length() + self.signature.length(),
        }
    }

    /// Encode the transaction fields and signature as an RLP list (without type byte).
    pub fn rlp_encode(&self, out: &mut dyn BufMut) {
        self.rlp_header().encode(out);
        self.tx.rlp_encode_fields(out);
        self.signature.encode(out);
    }

    /// Decode the RLP list (without type byte).
    pub fn rlp_decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let remaining = buf.len();

        if header.payload_length > remaining {
            return Err(alloy_rlp::Error::InputTooShort);
        }

        let tx = TempoTransaction::rlp_decode_fields(buf)?;
        let sig_bytes: Bytes = Decodable::decode(buf)?;

        if remaining - buf.len() != header.payload_length {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }

        let signature = TempoSignature::from_bytes(&sig_bytes).map_err(alloy_rlp::Error::Custom)?;

        Ok(Self::new(tx, signature))
    }
}

impl Typed2718 for AASigned {
    fn ty(&self) -> u8 {
        TEMPO_TX_TYPE_ID
    }
}

impl Encodable2718 for AASigned {
    fn encode_2718_len(&self) -> usize {
        1 + self.rlp_header().length_with_payload()
    }

    fn encode_2718(&self, out: &mut dyn BufMut) {
        out.put_u8(TEMPO_TX_TYPE_ID);
        self.rlp_encode(out);
    }
}

impl Decodable2718 for AASigned {
    fn typed_decode(ty: u8, buf: &mut &[u8]) -> Eip2718Result<Self> {
        if ty != TEMPO_TX_TYPE_ID {
            return Err(Eip2718Error::UnexpectedType(ty));
        }
        Ok(Self::rlp_decode(buf)?)
    }

    fn fallback_decode(_buf: &mut &[u8]) -> Eip2718Result<Self> {
        Err(Eip2718Error::UnexpectedType(0))
    }
}

impl PartialEq for AASigned {
    fn eq(&self, other: &Self) -> bool {
        self.tx == other.tx && self.signature == other.signature
    }
}

impl Eq for AASigned {}
