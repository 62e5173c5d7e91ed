//! Monetary units. Amounts are unsigned 256-bit wei.

use primitive_types::U256;

pub const WEI: u64 = 1;
pub const GWEI: u64 = 1_000_000_000;
pub const FINNEY: u64 = 1_000_000_000_000_000;
pub const ETHER: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(FINNEY) * U256::from(1_000u64)
}

pub fn finney(amount: u64) -> U256 {
    U256::from(amount) * U256::from(FINNEY)
}

pub fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::from(GWEI)
}
