//! The issuance stage.
//!
//! Walks canonical blocks above its own watermark up to the head reported by an earlier
//! stage, folding each block's issued and burnt amounts into running totals. A snapshot
//! of the totals is written for every block, so a run can stop at any block boundary and
//! an unwind only has to move the watermark.

use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver};
use ledgersync_chainstate::{Accumulator, ChainIndex, IssuanceIndex, StageId, StageProgress};
use ledgersync_consensus::{ChainParams, Hash256};
use ledgersync_log::{log_debug, log_error, log_info, log_warn};
use ledgersync_primitives::{hash_to_hex, Header};
use ledgersync_storage::{KeyValueStore, Transaction, TxScope};

use crate::cancel::Cancellation;
use crate::error::StageError;
use crate::metrics::{IssuanceMetrics, IssuanceMetricsSnapshot};
use crate::reward::{ConsensusEpoch, RewardResolver};
use crate::scanner::{CanonicalScanner, ScanError};

pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(20);

const LOG_PREFIX: &str = "[Issuance]";

#[derive(Clone, Debug)]
pub struct IssuanceConfig {
    pub params: ChainParams,
    /// Stage whose watermark is the target head of a run.
    pub head_stage: StageId,
    pub log_interval: Duration,
}

impl IssuanceConfig {
    pub fn new(params: ChainParams) -> Self {
        Self {
            params,
            head_stage: StageId::Bodies,
            log_interval: DEFAULT_LOG_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// The watermark already reached the head.
    UpToDate { progress: u64 },
    /// The chain's consensus never issues rewards; the watermark jumped to the head.
    Skipped { from: u64, to: u64 },
    Completed {
        from: u64,
        to: u64,
        totals: Accumulator,
    },
    /// Stopped on request after checkpointing `reached`.
    Cancelled {
        from: u64,
        reached: u64,
        totals: Accumulator,
    },
}

impl RunOutcome {
    pub fn progress(&self) -> u64 {
        match self {
            RunOutcome::UpToDate { progress } => *progress,
            RunOutcome::Skipped { to, .. } => *to,
            RunOutcome::Completed { to, .. } => *to,
            RunOutcome::Cancelled { reached, .. } => *reached,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnwindOutcome {
    Unchanged { progress: u64 },
    Unwound { from: u64, to: u64 },
}

struct ProgressLog {
    last_number: u64,
    last_at: Instant,
}

pub struct IssuanceStage {
    config: IssuanceConfig,
    resolver: RewardResolver,
    metrics: IssuanceMetrics,
}

impl IssuanceStage {
    pub fn new(config: IssuanceConfig) -> Self {
        let resolver = RewardResolver::for_forks(config.params.forks);
        Self {
            config,
            resolver,
            metrics: IssuanceMetrics::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: RewardResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &IssuanceConfig {
        &self.config
    }

    pub fn metrics(&self) -> IssuanceMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn progress<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<u64, StageError> {
        Ok(StageProgress::new(store).get(StageId::Issuance)?)
    }

    /// Totals as of block `number` (the nearest snapshot at or below it).
    pub fn totals_at<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        number: u64,
    ) -> Result<Accumulator, StageError> {
        Ok(IssuanceIndex::new(store).read_totals(number)?)
    }

    /// Runs forward to the head stage's watermark.
    ///
    /// With `tx` supplied all writes go into it and it is left for the caller to commit;
    /// otherwise the run opens its own transaction and commits it on success. On error
    /// an owned transaction is dropped, leaving the store as it was before the run.
    pub fn run<S: KeyValueStore>(
        &self,
        store: S,
        tx: Option<&Transaction<S>>,
        cancel: &Cancellation,
    ) -> Result<RunOutcome, StageError> {
        let scope = TxScope::open(store, tx);
        let outcome = self.run_in(scope.tx(), cancel)?;
        scope.finish()?;
        Ok(outcome)
    }

    fn run_in<S: KeyValueStore>(
        &self,
        tx: &Transaction<S>,
        cancel: &Cancellation,
    ) -> Result<RunOutcome, StageError> {
        let stages = StageProgress::new(tx);
        let head = stages.get(self.config.head_stage)?;
        let progress = stages.get(StageId::Issuance)?;

        // Breaks the watermark <= head rule when head < progress: the watermark stays above
        // the head until an explicit unwind lowers it.
        if head <= progress {
            log_debug!("{LOG_PREFIX} up to date at block {progress} (head {head})");
            return Ok(RunOutcome::UpToDate { progress });
        }

        if !self.config.params.consensus.uses_reward_issuance() {
            stages.set(StageId::Issuance, head)?;
            log_info!(
                "{LOG_PREFIX} {:?} consensus has no reward issuance; progress {progress} -> {head}",
                self.config.params.consensus
            );
            return Ok(RunOutcome::Skipped {
                from: progress,
                to: head,
            });
        }

        let index = ChainIndex::new(tx);
        let issuance = IssuanceIndex::new(tx);
        let mut totals = issuance.read_totals(progress)?;
        let baseline = self.metrics.snapshot();
        let started = Instant::now();
        let ticker = tick(self.config.log_interval);
        let mut log = ProgressLog {
            last_number: progress,
            last_at: started,
        };
        let mut position = progress;
        let mut cancelled = false;

        log_info!("{LOG_PREFIX} processing blocks {} to {head}", progress + 1);

        let scanner = CanonicalScanner::new(tx, progress + 1, head).with_metrics(&self.metrics);
        for item in scanner {
            if self.block_boundary(cancel, &ticker, position, &mut log) {
                cancelled = true;
                break;
            }
            let canonical = item.map_err(scan_error)?;
            let number = canonical.number;
            if number != position + 1 {
                return Err(missing_header(position + 1));
            }

            let delta = self.resolver.resolve(&canonical.header, || {
                self.fetch_uncles(&index, number, canonical.hash)
            })?;
            totals = totals
                .apply(delta.issued, delta.burnt)
                .ok_or(StageError::AmountOverflow { number })?;
            issuance.write_totals(number, &totals)?;
            self.metrics.record_block(
                delta.epoch == ConsensusEpoch::PostTransition,
                delta.uncles,
            );
            position = number;
        }

        if !cancelled && position < head {
            return Err(missing_header(position + 1));
        }
        if position != progress {
            stages.set(StageId::Issuance, position)?;
        }

        let elapsed = started.elapsed();
        let blocks = position - progress;
        let snapshot = self.metrics.snapshot().since(&baseline);
        log_info!(
            "{LOG_PREFIX} {} at block {position}: {blocks} blocks in {:.1}s ({:.1} blk/sec), issued {}, burnt {}, forks skipped {}, bodies fetched {}",
            if cancelled { "stopped" } else { "finished" },
            elapsed.as_secs_f64(),
            rate(blocks, elapsed),
            totals.issued,
            totals.burnt,
            snapshot.fork_headers_skipped,
            snapshot.bodies_fetched,
        );

        Ok(if cancelled {
            RunOutcome::Cancelled {
                from: progress,
                reached: position,
                totals,
            }
        } else {
            RunOutcome::Completed {
                from: progress,
                to: position,
                totals,
            }
        })
    }

    /// Waits on cancellation or the log ticker without blocking; true means stop.
    fn block_boundary(
        &self,
        cancel: &Cancellation,
        ticker: &Receiver<Instant>,
        position: u64,
        log: &mut ProgressLog,
    ) -> bool {
        select! {
            recv(cancel.receiver()) -> _ => return true,
            recv(ticker) -> _ => self.log_progress(position, log),
            default => {}
        }
        cancel.is_cancelled()
    }

    fn log_progress(&self, position: u64, log: &mut ProgressLog) {
        let now = Instant::now();
        let blocks = position.saturating_sub(log.last_number);
        if blocks == 0 {
            log_warn!(
                "{LOG_PREFIX} no progress past block {position} in {:.0}s",
                now.duration_since(log.last_at).as_secs_f64()
            );
        } else {
            log_info!(
                "{LOG_PREFIX} Wrote block issuance now={position} blk/sec={:.1}",
                rate(blocks, now.duration_since(log.last_at))
            );
        }
        log.last_number = position;
        log.last_at = now;
    }

    fn fetch_uncles<S: KeyValueStore + ?Sized>(
        &self,
        index: &ChainIndex<'_, S>,
        number: u64,
        hash: Hash256,
    ) -> Result<Vec<Header>, StageError> {
        self.metrics.record_body_fetch();
        match index.body(number, &hash) {
            Ok(Some(body)) => Ok(body.uncles),
            Ok(None) => {
                log_error!(
                    "{LOG_PREFIX} block {number} ({}) declares uncles but has no body",
                    hash_to_hex(&hash)
                );
                Err(StageError::MissingBody { number, hash })
            }
            Err(err) => Err(StageError::at(number, hash, err)),
        }
    }

    /// Moves the watermark back to `target`; snapshots are left in place.
    pub fn unwind<S: KeyValueStore>(
        &self,
        store: S,
        tx: Option<&Transaction<S>>,
        target: u64,
    ) -> Result<UnwindOutcome, StageError> {
        let scope = TxScope::open(store, tx);
        let stages = StageProgress::new(scope.tx());
        let progress = stages.get(StageId::Issuance)?;
        let outcome = if target >= progress {
            UnwindOutcome::Unchanged { progress }
        } else {
            stages.set(StageId::Issuance, target)?;
            log_info!("{LOG_PREFIX} unwound from block {progress} to {target}");
            UnwindOutcome::Unwound {
                from: progress,
                to: target,
            }
        };
        scope.finish()?;
        Ok(outcome)
    }

    /// Snapshots are never pruned; only a transaction opened here is finalized.
    pub fn prune<S: KeyValueStore>(
        &self,
        store: S,
        tx: Option<&Transaction<S>>,
    ) -> Result<(), StageError> {
        TxScope::open(store, tx).finish()?;
        Ok(())
    }
}

fn missing_header(number: u64) -> StageError {
    log_error!("{LOG_PREFIX} canonical chain has no header at block {number}");
    StageError::MissingCanonicalHeader { number }
}

fn scan_error(err: ScanError) -> StageError {
    match err {
        ScanError::Chain(err) => StageError::from(err),
        ScanError::Decode {
            number,
            hash,
            error,
        } => {
            log_error!(
                "{LOG_PREFIX} invalid header at block {number} ({}): {error}",
                hash_to_hex(&hash)
            );
            StageError::Decode {
                number,
                hash,
                error,
            }
        }
    }
}

fn rate(blocks: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        blocks as f64 / secs
    } else {
        blocks as f64
    }
}
