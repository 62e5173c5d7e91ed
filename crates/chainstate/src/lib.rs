//! Chain data and stage bookkeeping stored on top of `ledgersync-storage`.

pub mod error;
pub mod index;
pub mod issuance;
pub mod keys;
pub mod stages;

pub use error::ChainError;
pub use index::ChainIndex;
pub use issuance::{Accumulator, IssuanceIndex};
pub use keys::{block_number_key, decode_header_key, header_key, HEADER_KEY_LEN};
pub use stages::{StageId, StageProgress};
