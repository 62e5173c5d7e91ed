//! Per-block issuance snapshots.
//!
//! Each processed block stores the running totals as of that block, so rolling the stage
//! back is a watermark move and never a recomputation. Snapshots are only written forward;
//! an unwind leaves the ones above the new watermark in place until a later run
//! overwrites them.

use ledgersync_storage::{key_successor, Column, KeyValueStore};
use primitive_types::U512;

use crate::error::ChainError;
use crate::keys::{block_number_key, decode_block_number};

const TOTAL_LEN: usize = 64;
const ACCUMULATOR_LEN: usize = 2 * TOTAL_LEN;

/// Running totals in wei. 512 bits wide so a full 256x256-bit burn product always fits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Accumulator {
    pub issued: U512,
    pub burnt: U512,
}

impl Accumulator {
    pub const ZERO: Accumulator = Accumulator {
        issued: U512([0; 8]),
        burnt: U512([0; 8]),
    };

    /// Adds one block's deltas; `None` if either total would overflow.
    pub fn apply(&self, issued: U512, burnt: U512) -> Option<Self> {
        Some(Self {
            issued: self.issued.checked_add(issued)?,
            burnt: self.burnt.checked_add(burnt)?,
        })
    }

    pub fn encode(&self) -> [u8; ACCUMULATOR_LEN] {
        let mut out = [0u8; ACCUMULATOR_LEN];
        out[..TOTAL_LEN].copy_from_slice(&self.issued.to_big_endian());
        out[TOTAL_LEN..].copy_from_slice(&self.burnt.to_big_endian());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ChainError> {
        if bytes.len() != ACCUMULATOR_LEN {
            return Err(ChainError::CorruptRecord("issuance snapshot must be 128 bytes"));
        }
        Ok(Self {
            issued: U512::from_big_endian(&bytes[..TOTAL_LEN]),
            burnt: U512::from_big_endian(&bytes[TOTAL_LEN..]),
        })
    }
}

pub struct IssuanceIndex<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> IssuanceIndex<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Snapshot at the highest block `<= number`, or zero when none exists.
    pub fn read_totals(&self, number: u64) -> Result<Accumulator, ChainError> {
        let upper = key_successor(&block_number_key(number));
        match self.store.seek_before(Column::Issuance, &upper)? {
            Some((key, value)) => {
                if decode_block_number(&key).is_none() {
                    return Err(ChainError::CorruptRecord("issuance key must be 8 bytes"));
                }
                Accumulator::decode(&value)
            }
            None => Ok(Accumulator::ZERO),
        }
    }

    /// Snapshot stored for exactly `number`.
    pub fn totals_exact(&self, number: u64) -> Result<Option<Accumulator>, ChainError> {
        match self
            .store
            .get(Column::Issuance, &block_number_key(number))?
        {
            Some(value) => Accumulator::decode(&value).map(Some),
            None => Ok(None),
        }
    }

    pub fn write_totals(&self, number: u64, totals: &Accumulator) -> Result<(), ChainError> {
        self.store.put(
            Column::Issuance,
            &block_number_key(number),
            &totals.encode(),
        )?;
        Ok(())
    }
}
