//! Per-block issuance and burn deltas.
//!
//! Which reward formula applies is decided by the header itself: post-transition headers
//! carry the sentinel difficulty and earn a flat reward, everything else is paid by the
//! proof-of-work schedule including uncle rewards.

use ledgersync_consensus::{
    pow_rewards, ForkSchedule, POST_TRANSITION_BLOCK_REWARD, POST_TRANSITION_DIFFICULTY,
};
use ledgersync_primitives::{empty_uncle_hash, Header};
use primitive_types::{U256, U512};

use crate::error::StageError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConsensusEpoch {
    PreTransition,
    PostTransition,
}

impl ConsensusEpoch {
    pub fn of(header: &Header) -> Self {
        if header.difficulty == U256::from(POST_TRANSITION_DIFFICULTY) {
            ConsensusEpoch::PostTransition
        } else {
            ConsensusEpoch::PreTransition
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockRewards {
    pub block_reward: U256,
    pub uncle_rewards: Vec<U256>,
}

impl BlockRewards {
    /// Block reward plus every uncle reward.
    pub fn total(&self) -> U512 {
        self.uncle_rewards
            .iter()
            .fold(U512::from(self.block_reward), |total, reward| {
                total + U512::from(*reward)
            })
    }
}

/// A reward formula for one consensus epoch.
pub trait RewardSchedule: Send + Sync {
    /// `uncles` is `None` when the header declares no uncles.
    fn compute_rewards(&self, header: &Header, uncles: Option<&[Header]>) -> BlockRewards;
}

/// Block reward by fork plus depth-scaled uncle rewards.
pub struct ProofOfWorkRewards {
    forks: ForkSchedule,
}

impl ProofOfWorkRewards {
    pub fn new(forks: ForkSchedule) -> Self {
        Self { forks }
    }
}

impl RewardSchedule for ProofOfWorkRewards {
    fn compute_rewards(&self, header: &Header, uncles: Option<&[Header]>) -> BlockRewards {
        let uncle_numbers: Vec<u64> = uncles
            .unwrap_or_default()
            .iter()
            .map(|uncle| uncle.number)
            .collect();
        let rewards = pow_rewards(header.number, &uncle_numbers, &self.forks);
        BlockRewards {
            block_reward: rewards.block_reward,
            uncle_rewards: rewards.uncle_rewards,
        }
    }
}

pub struct FixedRewards {
    reward: U256,
}

impl FixedRewards {
    pub fn new(reward: U256) -> Self {
        Self { reward }
    }
}

impl Default for FixedRewards {
    fn default() -> Self {
        Self::new(POST_TRANSITION_BLOCK_REWARD)
    }
}

impl RewardSchedule for FixedRewards {
    fn compute_rewards(&self, _header: &Header, _uncles: Option<&[Header]>) -> BlockRewards {
        BlockRewards {
            block_reward: self.reward,
            uncle_rewards: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IssuanceDelta {
    pub issued: U512,
    /// `base_fee * gas_used`, exact for any 256-bit base fee.
    pub burnt: U512,
    pub epoch: ConsensusEpoch,
    pub uncles: usize,
}

pub struct RewardResolver {
    pre_transition: Box<dyn RewardSchedule>,
    post_transition: Box<dyn RewardSchedule>,
}

impl RewardResolver {
    pub fn new(
        pre_transition: Box<dyn RewardSchedule>,
        post_transition: Box<dyn RewardSchedule>,
    ) -> Self {
        Self {
            pre_transition,
            post_transition,
        }
    }

    pub fn for_forks(forks: ForkSchedule) -> Self {
        Self::new(
            Box::new(ProofOfWorkRewards::new(forks)),
            Box::new(FixedRewards::default()),
        )
    }

    /// Computes the deltas of one block.
    ///
    /// `fetch_uncles` runs at most once, and only for a pre-transition header whose
    /// uncle hash is not the empty-list hash.
    pub fn resolve<F>(&self, header: &Header, fetch_uncles: F) -> Result<IssuanceDelta, StageError>
    where
        F: FnOnce() -> Result<Vec<Header>, StageError>,
    {
        let burnt = match &header.base_fee {
            Some(base_fee) => base_fee.full_mul(U256::from(header.gas_used)),
            None => U512::zero(),
        };

        let epoch = ConsensusEpoch::of(header);
        let (rewards, uncles) = match epoch {
            ConsensusEpoch::PostTransition => {
                (self.post_transition.compute_rewards(header, None), 0)
            }
            ConsensusEpoch::PreTransition if header.uncle_hash == empty_uncle_hash() => {
                (self.pre_transition.compute_rewards(header, None), 0)
            }
            ConsensusEpoch::PreTransition => {
                let uncles = fetch_uncles()?;
                let rewards = self.pre_transition.compute_rewards(header, Some(&uncles));
                (rewards, uncles.len())
            }
        };

        Ok(IssuanceDelta {
            issued: rewards.total(),
            burnt,
            epoch,
            uncles,
        })
    }
}
