use ledgersync_storage::{Column, KeyValueStore};

use crate::error::ChainError;
use crate::keys::{block_number_key, decode_block_number};

/// Pipeline stages that keep a progress watermark.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StageId {
    Headers,
    Bodies,
    Issuance,
}

impl StageId {
    pub const ALL: [StageId; 3] = [StageId::Headers, StageId::Bodies, StageId::Issuance];

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Headers => "Headers",
            StageId::Bodies => "Bodies",
            StageId::Issuance => "Issuance",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

/// Progress registry: the highest block number each stage has fully processed.
pub struct StageProgress<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> StageProgress<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// A stage that has never recorded progress is at block 0.
    pub fn get(&self, stage: StageId) -> Result<u64, ChainError> {
        match self.store.get(Column::SyncStage, stage.as_str().as_bytes())? {
            Some(bytes) => decode_block_number(&bytes)
                .ok_or(ChainError::CorruptRecord("stage progress must be 8 bytes")),
            None => Ok(0),
        }
    }

    pub fn set(&self, stage: StageId, number: u64) -> Result<(), ChainError> {
        self.store.put(
            Column::SyncStage,
            stage.as_str().as_bytes(),
            &block_number_key(number),
        )?;
        Ok(())
    }
}
