//! Chain parameter definitions.

use crate::forks::ForkSchedule;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Dev,
}

impl Network {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Some(Self::Mainnet),
            "testnet" | "test" => Some(Self::Testnet),
            "dev" | "devnet" | "regtest" => Some(Self::Dev),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Dev => "dev",
        }
    }
}

/// Consensus engine family a chain runs from genesis.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConsensusKind {
    /// Proof-of-work with block and uncle rewards, later replaced by a fixed reward.
    Ethash,
    /// Proof-of-authority; sealers are not paid by issuance.
    Clique,
    Aura,
}

impl ConsensusKind {
    pub fn uses_reward_issuance(self) -> bool {
        matches!(self, ConsensusKind::Ethash)
    }
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub consensus: ConsensusKind,
    pub forks: ForkSchedule,
}

pub fn chain_params(network: Network) -> ChainParams {
    match network {
        Network::Mainnet => ChainParams {
            network,
            consensus: ConsensusKind::Ethash,
            forks: [Some(0), Some(4_370_000), Some(7_280_000)],
        },
        Network::Testnet => ChainParams {
            network,
            consensus: ConsensusKind::Clique,
            forks: [Some(0), Some(0), Some(0)],
        },
        Network::Dev => ChainParams {
            network,
            consensus: ConsensusKind::Ethash,
            forks: [Some(0), Some(0), Some(0)],
        },
    }
}
