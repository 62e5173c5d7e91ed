use std::sync::OnceLock;

use ledgersync_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::header::Header;

/// The part of a block body the issuance accounting needs: its uncle headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockBody {
    pub uncles: Vec<Header>,
}

impl BlockBody {
    pub fn encode(&self) -> Vec<u8> {
        crate::encoding::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        crate::encoding::decode(bytes)
    }

    pub fn uncle_hash(&self) -> Hash256 {
        uncle_hash(&self.uncles)
    }
}

fn encode_uncles(uncles: &[Header], encoder: &mut Encoder) {
    encoder.write_varint(uncles.len() as u64);
    for uncle in uncles {
        // Length-prefixed so the optional trailing base fee stays unambiguous.
        encoder.write_var_bytes(&uncle.encode());
    }
}

impl Encodable for BlockBody {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encode_uncles(&self.uncles, encoder);
    }
}

impl Decodable for BlockBody {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let count = decoder.read_varint()?;
        let count = usize::try_from(count).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut uncles = Vec::with_capacity(count.min(16));
        for _ in 0..count {
            let raw = decoder.read_var_bytes()?;
            uncles.push(Header::decode(&raw)?);
        }
        Ok(Self { uncles })
    }
}

pub fn uncle_hash(uncles: &[Header]) -> Hash256 {
    let mut encoder = Encoder::new();
    encode_uncles(uncles, &mut encoder);
    sha256d(&encoder.into_inner())
}

/// Uncle-list hash declared by headers that reference no uncles.
pub fn empty_uncle_hash() -> Hash256 {
    static EMPTY: OnceLock<Hash256> = OnceLock::new();
    *EMPTY.get_or_init(|| uncle_hash(&[]))
}
