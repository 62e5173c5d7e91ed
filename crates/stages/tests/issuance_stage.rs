use std::sync::Arc;

use ledgersync_chainstate::{
    header_key, Accumulator, ChainIndex, IssuanceIndex, StageId, StageProgress,
};
use ledgersync_consensus::money::{ether, gwei};
use ledgersync_consensus::{
    chain_params, ChainParams, ConsensusKind, Hash256, Network, POST_TRANSITION_BLOCK_REWARD,
};
use ledgersync_primitives::{empty_uncle_hash, uncle_hash, BlockBody, Header};
use ledgersync_stages::{
    BlockRewards, CancelHandle, Cancellation, FixedRewards, IssuanceConfig, IssuanceStage,
    ProofOfWorkRewards, RewardResolver, RewardSchedule, RunOutcome, StageError, UnwindOutcome,
};
use ledgersync_storage::memory::MemoryStore;
use ledgersync_storage::{Column, KeyValueStore, Transaction, WriteBatch};
use primitive_types::{U256, U512};

const GAS_USED: u64 = 50_000;

#[derive(Clone)]
enum Block {
    Pow {
        base_fee: Option<u64>,
        uncle_depths: Vec<u64>,
    },
    Pos {
        base_fee: u64,
    },
}

fn pow() -> Block {
    Block::Pow {
        base_fee: None,
        uncle_depths: Vec::new(),
    }
}

fn make_header(number: u64, parent_hash: Hash256, difficulty: u64, tag: u8) -> Header {
    Header {
        parent_hash,
        uncle_hash: empty_uncle_hash(),
        coinbase: [tag; 20],
        number,
        difficulty: U256::from(difficulty),
        gas_limit: 15_000_000,
        gas_used: GAS_USED,
        time: 1_500_000_000 + number * 14,
        extra: vec![tag],
        base_fee: None,
    }
}

struct Chain {
    store: Arc<MemoryStore>,
    hashes: Vec<Hash256>,
    blocks: Vec<Block>,
}

impl Chain {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let genesis = make_header(0, [0u8; 32], 1, 0);
        let mut batch = WriteBatch::new();
        let index = ChainIndex::new(store.as_ref());
        let hash = index.put_header(&mut batch, &genesis);
        index.set_canonical_hash(&mut batch, 0, &hash);
        store.write_batch(&batch).expect("genesis");
        Self {
            store,
            hashes: vec![hash],
            blocks: vec![pow()],
        }
    }

    fn tip(&self) -> u64 {
        self.hashes.len() as u64 - 1
    }

    /// Appends canonical blocks and raises the bodies watermark to the new tip.
    fn extend(&mut self, blocks: &[Block]) {
        let index = ChainIndex::new(self.store.as_ref());
        let mut batch = WriteBatch::new();
        for block in blocks {
            let number = self.tip() + 1;
            let parent = self.hashes[self.hashes.len() - 1];
            let (mut header, body) = match block {
                Block::Pow {
                    base_fee,
                    uncle_depths,
                } => {
                    let mut header = make_header(number, parent, 1_000, 1);
                    header.base_fee = base_fee.map(gwei);
                    let uncles: Vec<Header> = uncle_depths
                        .iter()
                        .map(|depth| make_header(number - depth, [0xee; 32], 900, 7))
                        .collect();
                    (header, BlockBody { uncles })
                }
                Block::Pos { base_fee } => {
                    let mut header = make_header(number, parent, 0, 1);
                    header.base_fee = Some(gwei(*base_fee));
                    (header, BlockBody::default())
                }
            };
            header.uncle_hash = uncle_hash(&body.uncles);
            let hash = index.put_header(&mut batch, &header);
            index.set_canonical_hash(&mut batch, number, &hash);
            index.put_body(&mut batch, number, &hash, &body);
            self.hashes.push(hash);
            self.blocks.push(block.clone());
        }
        self.store.write_batch(&batch).expect("extend");
        self.set_head(self.tip());
    }

    /// Re-points the canonical chain above `keep` to freshly stored `blocks`; the
    /// replaced headers stay in storage as fork entries.
    fn reorg(&mut self, keep: u64, blocks: &[Block]) {
        self.hashes.truncate(keep as usize + 1);
        self.blocks.truncate(keep as usize + 1);
        self.extend(blocks);
    }

    fn set_head(&self, head: u64) {
        StageProgress::new(self.store.as_ref())
            .set(StageId::Bodies, head)
            .expect("set head");
    }

    fn progress(&self) -> u64 {
        StageProgress::new(self.store.as_ref())
            .get(StageId::Issuance)
            .expect("progress")
    }

    fn snapshot(&self, number: u64) -> Option<Accumulator> {
        IssuanceIndex::new(self.store.as_ref())
            .totals_exact(number)
            .expect("snapshot")
    }

    /// Deltas every block should contribute on the dev network (2 ether base reward).
    fn expected_delta(&self, number: u64) -> (U512, U512) {
        let burn = |base_fee: u64| gwei(base_fee) * U256::from(GAS_USED);
        match &self.blocks[number as usize] {
            Block::Pow {
                base_fee,
                uncle_depths,
            } => {
                let mut issued = ether(2);
                for depth in uncle_depths {
                    issued = issued + ether(2) / U256::from(32u64);
                    issued = issued + ether(2) * U256::from(8 - depth) / U256::from(8u64);
                }
                (
                    U512::from(issued),
                    U512::from(base_fee.map(burn).unwrap_or_default()),
                )
            }
            Block::Pos { base_fee } => (
                U512::from(POST_TRANSITION_BLOCK_REWARD),
                U512::from(burn(*base_fee)),
            ),
        }
    }

    fn assert_fold(&self, to: u64) {
        let mut expected = Accumulator::ZERO;
        for number in 1..=to {
            let (issued, burnt) = self.expected_delta(number);
            expected = expected.apply(issued, burnt).expect("no overflow");
            assert_eq!(
                self.snapshot(number),
                Some(expected),
                "snapshot at block {number}"
            );
        }
    }
}

fn dev_stage() -> IssuanceStage {
    IssuanceStage::new(IssuanceConfig::new(chain_params(Network::Dev)))
}

fn run(stage: &IssuanceStage, chain: &Chain) -> Result<RunOutcome, StageError> {
    stage.run(Arc::clone(&chain.store), None, &Cancellation::never())
}

#[test]
fn fold_matches_per_block_deltas_and_resumes() {
    let mut chain = Chain::new();
    chain.extend(&[
        pow(),
        Block::Pow {
            base_fee: Some(7),
            uncle_depths: Vec::new(),
        },
        pow(),
        Block::Pow {
            base_fee: Some(3),
            uncle_depths: vec![1, 2],
        },
        Block::Pos { base_fee: 11 },
        Block::Pos { base_fee: 0 },
    ]);
    let stage = dev_stage();

    let outcome = run(&stage, &chain).expect("run");
    assert!(matches!(outcome, RunOutcome::Completed { from: 0, to: 6, .. }));
    assert_eq!(chain.progress(), 6);
    chain.assert_fold(6);
    assert_eq!(
        Some(stage.totals_at(chain.store.as_ref(), 6).expect("totals")),
        chain.snapshot(6)
    );

    assert_eq!(
        run(&stage, &chain).expect("rerun"),
        RunOutcome::UpToDate { progress: 6 }
    );

    chain.extend(&[pow(), Block::Pos { base_fee: 2 }]);
    let outcome = run(&stage, &chain).expect("resume");
    assert!(matches!(outcome, RunOutcome::Completed { from: 6, to: 8, .. }));
    chain.assert_fold(8);

    let metrics = stage.metrics();
    assert_eq!(metrics.blocks_folded, 8);
    assert_eq!(metrics.post_transition_blocks, 3);
    assert_eq!(metrics.uncles_rewarded, 2);
}

#[test]
fn fork_headers_never_contribute() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow(), pow(), pow()]);

    let index = ChainIndex::new(chain.store.as_ref());
    let mut batch = WriteBatch::new();
    for number in 2..=4 {
        let mut stale = make_header(number, [0xaa; 32], 0, 9);
        stale.base_fee = Some(gwei(1_000_000));
        index.put_header(&mut batch, &stale);
    }
    chain.store.write_batch(&batch).expect("forks");

    let stage = dev_stage();
    run(&stage, &chain).expect("run");
    chain.assert_fold(4);
    assert_eq!(stage.metrics().fork_headers_skipped, 3);
    assert_eq!(stage.metrics().post_transition_blocks, 0);
}

#[test]
fn foreign_length_keys_are_ignored() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow(), pow()]);
    chain
        .store
        .put(Column::Headers, &[0, 0, 0, 0, 0, 0, 0, 2, 1], b"junk")
        .expect("put");
    let mut long_key = header_key(2, &[1u8; 32]).to_vec();
    long_key.push(0);
    chain
        .store
        .put(Column::Headers, &long_key, b"junk")
        .expect("put");

    let stage = dev_stage();
    run(&stage, &chain).expect("run");
    chain.assert_fold(3);
    assert_eq!(stage.metrics().foreign_keys_skipped, 2);
}

#[test]
fn unwind_then_rerun_reproduces_snapshots() {
    let mut chain = Chain::new();
    chain.extend(&[
        pow(),
        Block::Pow {
            base_fee: Some(4),
            uncle_depths: vec![1],
        },
        pow(),
        Block::Pos { base_fee: 9 },
        pow(),
        Block::Pos { base_fee: 1 },
        pow(),
    ]);
    let stage = dev_stage();
    run(&stage, &chain).expect("run");
    let before: Vec<Option<Accumulator>> = (0..=7).map(|n| chain.snapshot(n)).collect();

    let outcome = stage
        .unwind(Arc::clone(&chain.store), None, 3)
        .expect("unwind");
    assert_eq!(outcome, UnwindOutcome::Unwound { from: 7, to: 3 });
    assert_eq!(chain.progress(), 3);
    assert_eq!(
        stage.totals_at(chain.store.as_ref(), chain.progress()).expect("totals"),
        before[3].expect("snapshot 3")
    );

    let outcome = run(&stage, &chain).expect("rerun");
    assert!(matches!(outcome, RunOutcome::Completed { from: 3, to: 7, .. }));
    let after: Vec<Option<Accumulator>> = (0..=7).map(|n| chain.snapshot(n)).collect();
    assert_eq!(before, after);
}

#[test]
fn rerun_after_unwind_follows_the_new_canonical_branch() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow(), pow(), pow()]);
    let stage = dev_stage();
    run(&stage, &chain).expect("run");
    let old_tip = chain.snapshot(4).expect("snapshot 4");
    assert_eq!(old_tip.issued, U512::from(ether(8)));

    stage
        .unwind(Arc::clone(&chain.store), None, 2)
        .expect("unwind");
    chain.reorg(
        2,
        &[
            Block::Pos { base_fee: 10 },
            Block::Pos { base_fee: 10 },
            Block::Pos { base_fee: 3 },
        ],
    );

    let outcome = run(&stage, &chain).expect("rerun");
    assert!(matches!(outcome, RunOutcome::Completed { from: 2, to: 5, .. }));
    chain.assert_fold(5);
    let new_tip = chain.snapshot(4).expect("snapshot 4");
    assert_ne!(new_tip, old_tip);
    assert_eq!(
        new_tip.issued,
        U512::from(ether(4) + POST_TRANSITION_BLOCK_REWARD * U256::from(2u64))
    );
    assert_eq!(
        new_tip.burnt,
        U512::from(gwei(10) * U256::from(2 * GAS_USED))
    );
    assert_eq!(stage.metrics().fork_headers_skipped, 2);
}

#[test]
fn huge_base_fee_burn_is_folded_exactly() {
    let mut chain = Chain::new();
    chain.extend(&[pow()]);

    let base_fee = U256::MAX / U256::from(2u64);
    let mut header = make_header(2, chain.hashes[1], 1_000, 1);
    header.base_fee = Some(base_fee);
    let index = ChainIndex::new(chain.store.as_ref());
    let mut batch = WriteBatch::new();
    let hash = index.put_header(&mut batch, &header);
    index.set_canonical_hash(&mut batch, 2, &hash);
    chain.store.write_batch(&batch).expect("write");
    chain.set_head(2);

    let outcome = run(&dev_stage(), &chain).expect("run");
    assert!(matches!(outcome, RunOutcome::Completed { from: 0, to: 2, .. }));
    let burnt = base_fee.full_mul(U256::from(GAS_USED));
    assert!(burnt > U512::from(U256::MAX));
    assert_eq!(
        chain.snapshot(2),
        Some(Accumulator {
            issued: U512::from(ether(4)),
            burnt,
        })
    );
}

#[test]
fn unwind_at_or_above_progress_is_a_no_op() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow()]);
    let stage = dev_stage();
    run(&stage, &chain).expect("run");

    for target in [2, 5] {
        let outcome = stage
            .unwind(Arc::clone(&chain.store), None, target)
            .expect("unwind");
        assert_eq!(outcome, UnwindOutcome::Unchanged { progress: 2 });
    }
    assert_eq!(chain.progress(), 2);
}

#[test]
fn post_transition_block_earns_flat_reward_and_burns_fee() {
    let mut chain = Chain::new();
    chain.extend(&[Block::Pos { base_fee: 25 }]);
    let stage = dev_stage();
    run(&stage, &chain).expect("run");
    assert_eq!(
        chain.snapshot(1),
        Some(Accumulator {
            issued: U512::from(POST_TRANSITION_BLOCK_REWARD),
            burnt: U512::from(gwei(25) * U256::from(GAS_USED)),
        })
    );
    assert_eq!(stage.metrics().bodies_fetched, 0);
}

#[test]
fn legacy_block_without_uncles_earns_exact_block_reward() {
    let mut chain = Chain::new();
    chain.extend(&[pow()]);
    let stage = IssuanceStage::new(IssuanceConfig::new(chain_params(Network::Mainnet)));
    run(&stage, &chain).expect("run");
    assert_eq!(
        chain.snapshot(1),
        Some(Accumulator {
            issued: U512::from(ether(5)),
            burnt: U512::zero(),
        })
    );
    assert_eq!(stage.metrics().bodies_fetched, 0);
}

#[test]
fn bodies_are_fetched_only_for_blocks_with_uncles() {
    let mut chain = Chain::new();
    chain.extend(&[
        pow(),
        pow(),
        Block::Pow {
            base_fee: None,
            uncle_depths: vec![1],
        },
        pow(),
    ]);
    let stage = dev_stage();
    run(&stage, &chain).expect("run");
    chain.assert_fold(4);
    assert_eq!(stage.metrics().bodies_fetched, 1);
}

#[test]
fn missing_body_fails_without_moving_watermark() {
    let mut chain = Chain::new();
    chain.extend(&[
        pow(),
        Block::Pow {
            base_fee: None,
            uncle_depths: vec![1],
        },
    ]);
    chain
        .store
        .delete(Column::BlockBody, &header_key(2, &chain.hashes[2]))
        .expect("delete body");

    let err = run(&dev_stage(), &chain).unwrap_err();
    assert!(matches!(err, StageError::MissingBody { number: 2, .. }));
    assert_eq!(chain.progress(), 0);
    assert_eq!(chain.snapshot(1), None);
}

/// Proof-of-work schedule that raises cancellation while computing block `at`.
struct CancelAt {
    inner: ProofOfWorkRewards,
    at: u64,
    handle: CancelHandle,
}

impl RewardSchedule for CancelAt {
    fn compute_rewards(&self, header: &Header, uncles: Option<&[Header]>) -> BlockRewards {
        if header.number == self.at {
            self.handle.cancel();
        }
        self.inner.compute_rewards(header, uncles)
    }
}

#[test]
fn cancelled_run_checkpoints_processed_blocks_and_resumes() {
    let blocks = vec![
        pow(),
        Block::Pow {
            base_fee: Some(2),
            uncle_depths: Vec::new(),
        },
        pow(),
        Block::Pow {
            base_fee: Some(5),
            uncle_depths: vec![3],
        },
        pow(),
        pow(),
        pow(),
        pow(),
    ];
    let mut chain = Chain::new();
    chain.extend(&blocks[..3]);
    run(&dev_stage(), &chain).expect("first run");
    chain.extend(&blocks[3..]);

    let params = chain_params(Network::Dev);
    let (handle, cancel) = Cancellation::new();
    let stage = dev_stage().with_resolver(RewardResolver::new(
        Box::new(CancelAt {
            inner: ProofOfWorkRewards::new(params.forks),
            at: 6,
            handle,
        }),
        Box::new(FixedRewards::default()),
    ));
    let outcome = stage
        .run(Arc::clone(&chain.store), None, &cancel)
        .expect("cancelled run");
    match outcome {
        RunOutcome::Cancelled {
            from,
            reached,
            totals,
        } => {
            assert_eq!((from, reached), (3, 6));
            assert_eq!(Some(totals), chain.snapshot(6));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(chain.progress(), 6);
    assert_eq!(chain.snapshot(7), None);
    chain.assert_fold(6);

    let outcome = run(&dev_stage(), &chain).expect("resume");
    assert!(matches!(outcome, RunOutcome::Completed { from: 6, to: 8, .. }));
    chain.assert_fold(8);

    let mut fresh = Chain::new();
    fresh.extend(&blocks);
    run(&dev_stage(), &fresh).expect("uninterrupted");
    assert_eq!(fresh.snapshot(8), chain.snapshot(8));
}

#[test]
fn cancellation_before_start_processes_nothing() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow()]);
    let (handle, cancel) = Cancellation::new();
    handle.cancel();

    let outcome = dev_stage()
        .run(Arc::clone(&chain.store), None, &cancel)
        .expect("run");
    assert!(matches!(outcome, RunOutcome::Cancelled { from: 0, reached: 0, .. }));
    assert_eq!(chain.progress(), 0);
    assert_eq!(chain.snapshot(1), None);
}

#[test]
fn non_reward_consensus_jumps_to_head() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), Block::Pos { base_fee: 3 }, pow()]);
    let params = ChainParams {
        consensus: ConsensusKind::Clique,
        ..chain_params(Network::Dev)
    };
    let stage = IssuanceStage::new(IssuanceConfig::new(params));

    let outcome = run(&stage, &chain).expect("run");
    assert_eq!(outcome, RunOutcome::Skipped { from: 0, to: 3 });
    assert_eq!(chain.progress(), 3);
    assert_eq!(chain.store.len(Column::Issuance).expect("len"), 0);
    assert_eq!(
        stage.totals_at(chain.store.as_ref(), 3).expect("totals"),
        Accumulator::ZERO
    );
}

#[test]
fn malformed_canonical_header_fails_the_run() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow(), pow(), pow()]);
    chain
        .store
        .put(Column::Headers, &header_key(3, &chain.hashes[3]), &[1, 2, 3])
        .expect("corrupt");

    let err = run(&dev_stage(), &chain).unwrap_err();
    match err {
        StageError::Decode { number, hash, .. } => {
            assert_eq!(number, 3);
            assert_eq!(hash, chain.hashes[3]);
        }
        other => panic!("expected decode failure, got {other:?}"),
    }
    assert_eq!(chain.progress(), 0);
    assert_eq!(chain.store.len(Column::Issuance).expect("len"), 0);
}

#[test]
fn gap_in_canonical_chain_is_reported() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow(), pow(), pow()]);
    let mut batch = WriteBatch::new();
    ChainIndex::new(chain.store.as_ref()).clear_canonical_hash(&mut batch, 3);
    chain.store.write_batch(&batch).expect("clear");

    let err = run(&dev_stage(), &chain).unwrap_err();
    assert!(matches!(err, StageError::MissingCanonicalHeader { number: 3 }));
    assert_eq!(chain.progress(), 0);
}

#[test]
fn head_beyond_stored_headers_is_reported() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow()]);
    chain.set_head(5);

    let err = run(&dev_stage(), &chain).unwrap_err();
    assert!(matches!(err, StageError::MissingCanonicalHeader { number: 3 }));
}

#[test]
fn head_below_progress_is_up_to_date() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow(), pow()]);
    let stage = dev_stage();
    run(&stage, &chain).expect("run");
    chain.set_head(1);
    assert_eq!(
        run(&stage, &chain).expect("run"),
        RunOutcome::UpToDate { progress: 3 }
    );
}

#[test]
fn caller_transaction_is_left_uncommitted() {
    let mut chain = Chain::new();
    chain.extend(&[pow(), pow()]);
    let stage = dev_stage();
    let tx = Transaction::begin(Arc::clone(&chain.store));

    let outcome = stage
        .run(Arc::clone(&chain.store), Some(&tx), &Cancellation::never())
        .expect("run");
    assert!(matches!(outcome, RunOutcome::Completed { to: 2, .. }));
    assert_eq!(stage.progress(&tx).expect("progress"), 2);
    assert_eq!(chain.progress(), 0);
    assert_eq!(chain.snapshot(2), None);

    stage
        .prune(Arc::clone(&chain.store), Some(&tx))
        .expect("prune");
    stage
        .unwind(Arc::clone(&chain.store), Some(&tx), 1)
        .expect("unwind");
    assert_eq!(chain.progress(), 0);
    assert_eq!(stage.progress(&tx).expect("progress"), 1);

    tx.commit().expect("commit");
    assert_eq!(chain.progress(), 1);
    chain.assert_fold(2);
}

#[test]
fn run_logs_finish_summary() {
    ledgersync_log::set_stderr_enabled(false);
    ledgersync_log::enable_capture(1024);
    let mut chain = Chain::new();
    chain.extend(&vec![pow(); 13]);

    run(&dev_stage(), &chain).expect("run");

    let records = ledgersync_log::capture_snapshot(1024);
    assert!(records.iter().any(|record| {
        record.target == "ledgersync_stages::issuance"
            && record.level == ledgersync_log::Level::Info
            && record.msg.starts_with("[Issuance] finished at block 13: 13 blocks")
    }));
}

#[test]
fn finish_summary_counts_only_the_current_run() {
    ledgersync_log::set_stderr_enabled(false);
    ledgersync_log::enable_capture(1024);
    let mut chain = Chain::new();
    chain.extend(&vec![pow(); 17]);
    let stage = dev_stage();
    run(&stage, &chain).expect("run");

    stage
        .unwind(Arc::clone(&chain.store), None, 15)
        .expect("unwind");
    chain.reorg(
        15,
        &[
            Block::Pow {
                base_fee: None,
                uncle_depths: vec![1],
            },
            pow(),
            pow(),
            pow(),
        ],
    );
    run(&stage, &chain).expect("rerun");
    chain.extend(&[pow()]);
    run(&stage, &chain).expect("third run");

    let records = ledgersync_log::capture_snapshot(1024);
    assert!(records.iter().any(|record| {
        record.msg.starts_with("[Issuance] finished at block 19: 4 blocks")
            && record.msg.ends_with("forks skipped 2, bodies fetched 1")
    }));
    assert!(records.iter().any(|record| {
        record.msg.starts_with("[Issuance] finished at block 20: 1 blocks")
            && record.msg.ends_with("forks skipped 0, bodies fetched 0")
    }));
    assert_eq!(stage.metrics().fork_headers_skipped, 2);
}
