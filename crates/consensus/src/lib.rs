//! Chain parameters, fork schedule, and block reward formulas.

pub mod forks;
pub mod money;
pub mod params;
pub mod rewards;

pub use forks::{fork_active, Fork, ForkSchedule, Hash256};
pub use params::{chain_params, ChainParams, ConsensusKind, Network};
pub use rewards::{
    pow_block_reward, pow_rewards, uncle_reward, PowRewards, POST_TRANSITION_BLOCK_REWARD,
    POST_TRANSITION_DIFFICULTY,
};
