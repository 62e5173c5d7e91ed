use ledgersync_primitives::DecodeError;
use ledgersync_storage::StoreError;

#[derive(Debug)]
pub enum ChainError {
    Store(StoreError),
    Decode(DecodeError),
    /// A record whose key or value does not have the schema's shape.
    CorruptRecord(&'static str),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::Store(err) => write!(f, "{err}"),
            ChainError::Decode(err) => write!(f, "{err}"),
            ChainError::CorruptRecord(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<StoreError> for ChainError {
    fn from(err: StoreError) -> Self {
        ChainError::Store(err)
    }
}

impl From<DecodeError> for ChainError {
    fn from(err: DecodeError) -> Self {
        ChainError::Decode(err)
    }
}
