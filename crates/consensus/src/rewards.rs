//! Block and uncle reward schedule.

use primitive_types::U256;

use crate::forks::{fork_active, Fork, ForkSchedule};
use crate::money::ether;

/// Difficulty carried by every header produced after the proof-of-work transition.
pub const POST_TRANSITION_DIFFICULTY: u64 = 0;

/// Flat per-block reward after the transition: 0.3 ether.
pub const POST_TRANSITION_BLOCK_REWARD: U256 = U256([300_000_000_000_000_000, 0, 0, 0]);

/// Distance, in blocks, over which an uncle's reward decays to zero.
const UNCLE_DEPTH_DIVISOR: u64 = 8;
/// Inclusion bonus paid to the miner is `reward / 32` per referenced uncle.
const UNCLE_INCLUSION_DIVISOR: u64 = 32;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PowRewards {
    /// Paid to the block's miner, including the uncle inclusion bonus.
    pub block_reward: U256,
    pub uncle_rewards: Vec<U256>,
}

pub fn pow_block_reward(number: u64, forks: &ForkSchedule) -> U256 {
    if fork_active(number, forks, Fork::Constantinople) {
        ether(2)
    } else if fork_active(number, forks, Fork::Byzantium) {
        ether(3)
    } else {
        ether(5)
    }
}

/// Reward for an uncle at `uncle_number` included by block `number`.
///
/// Uncles deeper than the decay window earn nothing.
pub fn uncle_reward(number: u64, uncle_number: u64, reward: U256) -> U256 {
    let depth_credit = uncle_number
        .saturating_add(UNCLE_DEPTH_DIVISOR)
        .saturating_sub(number);
    reward * U256::from(depth_credit) / U256::from(UNCLE_DEPTH_DIVISOR)
}

pub fn pow_rewards(number: u64, uncle_numbers: &[u64], forks: &ForkSchedule) -> PowRewards {
    let reward = pow_block_reward(number, forks);
    let bonus = reward / U256::from(UNCLE_INCLUSION_DIVISOR);
    let mut block_reward = reward;
    let mut uncle_rewards = Vec::with_capacity(uncle_numbers.len());
    for uncle_number in uncle_numbers {
        uncle_rewards.push(uncle_reward(number, *uncle_number, reward));
        block_reward = block_reward.saturating_add(bonus);
    }
    PowRewards {
        block_reward,
        uncle_rewards,
    }
}
