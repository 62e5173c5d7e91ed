//! Block header type.

use ledgersync_consensus::Hash256;
use primitive_types::U256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;

pub type Address = [u8; 20];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub parent_hash: Hash256,
    pub uncle_hash: Hash256,
    pub coinbase: Address,
    pub number: u64,
    pub difficulty: U256,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub time: u64,
    pub extra: Vec<u8>,
    /// Present only on headers produced after the fee-market upgrade.
    pub base_fee: Option<U256>,
}

impl Header {
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.encode())
    }

    pub fn encode(&self) -> Vec<u8> {
        crate::encoding::encode(self)
    }

    /// Decodes a stored header; the trailing base fee is read only if bytes remain.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        crate::encoding::decode(bytes)
    }

    fn decode_fixed(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            parent_hash: decoder.read_hash()?,
            uncle_hash: decoder.read_hash()?,
            coinbase: decoder.read_fixed()?,
            number: decoder.read_u64_le()?,
            difficulty: decoder.read_u256_be()?,
            gas_limit: decoder.read_u64_le()?,
            gas_used: decoder.read_u64_le()?,
            time: decoder.read_u64_le()?,
            extra: decoder.read_var_bytes()?,
            base_fee: None,
        })
    }
}

impl Encodable for Header {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_hash(&self.parent_hash);
        encoder.write_hash(&self.uncle_hash);
        encoder.write_bytes(&self.coinbase);
        encoder.write_u64_le(self.number);
        encoder.write_u256_be(&self.difficulty);
        encoder.write_u64_le(self.gas_limit);
        encoder.write_u64_le(self.gas_used);
        encoder.write_u64_le(self.time);
        encoder.write_var_bytes(&self.extra);
        if let Some(base_fee) = &self.base_fee {
            encoder.write_u256_be(base_fee);
        }
    }
}

impl Decodable for Header {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let mut header = Self::decode_fixed(decoder)?;
        if !decoder.is_empty() {
            header.base_fee = Some(decoder.read_u256_be()?);
        }
        Ok(header)
    }
}
