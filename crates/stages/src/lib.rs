//! Staged-sync units that fold chain data into derived indexes.

pub mod cancel;
pub mod error;
pub mod issuance;
pub mod metrics;
pub mod reward;
pub mod scanner;

pub use cancel::{CancelHandle, Cancellation};
pub use error::StageError;
pub use issuance::{
    IssuanceConfig, IssuanceStage, RunOutcome, UnwindOutcome, DEFAULT_LOG_INTERVAL,
};
pub use metrics::{IssuanceMetrics, IssuanceMetricsSnapshot};
pub use reward::{
    BlockRewards, ConsensusEpoch, FixedRewards, IssuanceDelta, ProofOfWorkRewards,
    RewardResolver, RewardSchedule,
};
pub use scanner::{CanonicalHeader, CanonicalScanner, ScanError};
