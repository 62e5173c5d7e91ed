use ledgersync_chainstate::ChainError;
use ledgersync_consensus::Hash256;
use ledgersync_primitives::{hash_to_hex, DecodeError};
use ledgersync_storage::StoreError;

#[derive(Debug)]
pub enum StageError {
    Store(StoreError),
    /// A canonical header (or its body) that could not be decoded.
    Decode {
        number: u64,
        hash: Hash256,
        error: DecodeError,
    },
    CorruptRecord(&'static str),
    /// The header declares uncles but no body is stored for it.
    MissingBody { number: u64, hash: Hash256 },
    /// The canonical chain has no header at a height below the target head.
    MissingCanonicalHeader { number: u64 },
    AmountOverflow { number: u64 },
}

impl StageError {
    /// Attaches the block being processed to a chain-store failure.
    pub fn at(number: u64, hash: Hash256, err: ChainError) -> Self {
        match err {
            ChainError::Decode(error) => StageError::Decode {
                number,
                hash,
                error,
            },
            other => StageError::from(other),
        }
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageError::Store(err) => write!(f, "{err}"),
            StageError::Decode {
                number,
                hash,
                error,
            } => write!(
                f,
                "invalid block record {number} ({}): {error}",
                hash_to_hex(hash)
            ),
            StageError::CorruptRecord(message) => write!(f, "{message}"),
            StageError::MissingBody { number, hash } => {
                write!(f, "missing body for block {number} ({})", hash_to_hex(hash))
            }
            StageError::MissingCanonicalHeader { number } => {
                write!(f, "missing canonical header for block {number}")
            }
            StageError::AmountOverflow { number } => {
                write!(f, "issuance totals overflow at block {number}")
            }
        }
    }
}

impl std::error::Error for StageError {}

impl From<StoreError> for StageError {
    fn from(err: StoreError) -> Self {
        StageError::Store(err)
    }
}

impl From<ChainError> for StageError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Store(err) => StageError::Store(err),
            ChainError::CorruptRecord(message) => StageError::CorruptRecord(message),
            ChainError::Decode(_) => StageError::CorruptRecord("undecodable chain record"),
        }
    }
}
