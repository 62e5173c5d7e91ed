//! Header and block body types with their storage serialization.

pub mod body;
pub mod encoding;
pub mod hash;
pub mod header;

pub use body::{empty_uncle_hash, uncle_hash, BlockBody};
pub use encoding::DecodeError;
pub use hash::{hash_to_hex, sha256, sha256d};
pub use header::{Address, Header};
