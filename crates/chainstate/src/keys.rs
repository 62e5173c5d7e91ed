//! Key layouts shared by the chain and stage columns.
//!
//! Block numbers are big-endian so that key order is numeric order, which lets a forward
//! cursor walk headers by height and lets `seek_before` find the latest snapshot at or
//! below a height.

use ledgersync_consensus::Hash256;

pub const BLOCK_NUMBER_KEY_LEN: usize = 8;
pub const HEADER_KEY_LEN: usize = BLOCK_NUMBER_KEY_LEN + 32;

pub fn block_number_key(number: u64) -> [u8; BLOCK_NUMBER_KEY_LEN] {
    number.to_be_bytes()
}

pub fn decode_block_number(bytes: &[u8]) -> Option<u64> {
    let bytes: [u8; BLOCK_NUMBER_KEY_LEN] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// `number ‖ hash`, the key of header and body records.
pub fn header_key(number: u64, hash: &Hash256) -> [u8; HEADER_KEY_LEN] {
    let mut key = [0u8; HEADER_KEY_LEN];
    key[..BLOCK_NUMBER_KEY_LEN].copy_from_slice(&number.to_be_bytes());
    key[BLOCK_NUMBER_KEY_LEN..].copy_from_slice(hash);
    key
}

/// Splits a header key; `None` for keys of any other length.
pub fn decode_header_key(key: &[u8]) -> Option<(u64, Hash256)> {
    if key.len() != HEADER_KEY_LEN {
        return None;
    }
    let number = decode_block_number(&key[..BLOCK_NUMBER_KEY_LEN])?;
    let hash: Hash256 = key[BLOCK_NUMBER_KEY_LEN..].try_into().ok()?;
    Some((number, hash))
}
