use ledgersync_consensus::Hash256;
use ledgersync_primitives::{BlockBody, Header};
use ledgersync_storage::{Column, KeyValueStore, WriteBatch};

use crate::error::ChainError;
use crate::keys::{block_number_key, header_key};

/// Read and batch-write access to headers, bodies and the canonical pointers.
pub struct ChainIndex<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> ChainIndex<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn canonical_hash(&self, number: u64) -> Result<Option<Hash256>, ChainError> {
        let bytes = match self
            .store
            .get(Column::CanonicalHash, &block_number_key(number))?
        {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        decode_hash(&bytes).map(Some)
    }

    pub fn header_bytes(&self, number: u64, hash: &Hash256) -> Result<Option<Vec<u8>>, ChainError> {
        Ok(self.store.get(Column::Headers, &header_key(number, hash))?)
    }

    pub fn header(&self, number: u64, hash: &Hash256) -> Result<Option<Header>, ChainError> {
        match self.header_bytes(number, hash)? {
            Some(bytes) => Ok(Some(Header::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn body(&self, number: u64, hash: &Hash256) -> Result<Option<BlockBody>, ChainError> {
        let bytes = match self.store.get(Column::BlockBody, &header_key(number, hash))? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        Ok(Some(BlockBody::decode(&bytes)?))
    }

    pub fn put_header(&self, batch: &mut WriteBatch, header: &Header) -> Hash256 {
        let hash = header.hash();
        batch.put(
            Column::Headers,
            header_key(header.number, &hash),
            header.encode(),
        );
        hash
    }

    pub fn set_canonical_hash(&self, batch: &mut WriteBatch, number: u64, hash: &Hash256) {
        batch.put(Column::CanonicalHash, block_number_key(number), *hash);
    }

    pub fn clear_canonical_hash(&self, batch: &mut WriteBatch, number: u64) {
        batch.delete(Column::CanonicalHash, block_number_key(number));
    }

    pub fn put_body(&self, batch: &mut WriteBatch, number: u64, hash: &Hash256, body: &BlockBody) {
        batch.put(Column::BlockBody, header_key(number, hash), body.encode());
    }
}

fn decode_hash(bytes: &[u8]) -> Result<Hash256, ChainError> {
    bytes
        .try_into()
        .map_err(|_| ChainError::CorruptRecord("canonical hash must be 32 bytes"))
}
