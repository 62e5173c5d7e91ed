//! Issuance stage counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IssuanceMetrics {
    blocks_folded: AtomicU64,
    post_transition_blocks: AtomicU64,
    fork_headers_skipped: AtomicU64,
    foreign_keys_skipped: AtomicU64,
    bodies_fetched: AtomicU64,
    uncles_rewarded: AtomicU64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IssuanceMetricsSnapshot {
    pub blocks_folded: u64,
    pub post_transition_blocks: u64,
    pub fork_headers_skipped: u64,
    pub foreign_keys_skipped: u64,
    pub bodies_fetched: u64,
    pub uncles_rewarded: u64,
}

impl IssuanceMetricsSnapshot {
    /// Counts recorded after `earlier` was taken.
    pub fn since(&self, earlier: &IssuanceMetricsSnapshot) -> IssuanceMetricsSnapshot {
        IssuanceMetricsSnapshot {
            blocks_folded: self.blocks_folded.saturating_sub(earlier.blocks_folded),
            post_transition_blocks: self
                .post_transition_blocks
                .saturating_sub(earlier.post_transition_blocks),
            fork_headers_skipped: self
                .fork_headers_skipped
                .saturating_sub(earlier.fork_headers_skipped),
            foreign_keys_skipped: self
                .foreign_keys_skipped
                .saturating_sub(earlier.foreign_keys_skipped),
            bodies_fetched: self.bodies_fetched.saturating_sub(earlier.bodies_fetched),
            uncles_rewarded: self.uncles_rewarded.saturating_sub(earlier.uncles_rewarded),
        }
    }
}

impl IssuanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_block(&self, post_transition: bool, uncles: usize) {
        self.blocks_folded.fetch_add(1, Ordering::Relaxed);
        if post_transition {
            self.post_transition_blocks.fetch_add(1, Ordering::Relaxed);
        }
        self.uncles_rewarded
            .fetch_add(uncles as u64, Ordering::Relaxed);
    }

    pub fn record_fork_header(&self) {
        self.fork_headers_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_foreign_key(&self) {
        self.foreign_keys_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_body_fetch(&self) {
        self.bodies_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IssuanceMetricsSnapshot {
        IssuanceMetricsSnapshot {
            blocks_folded: self.blocks_folded.load(Ordering::Relaxed),
            post_transition_blocks: self.post_transition_blocks.load(Ordering::Relaxed),
            fork_headers_skipped: self.fork_headers_skipped.load(Ordering::Relaxed),
            foreign_keys_skipped: self.foreign_keys_skipped.load(Ordering::Relaxed),
            bodies_fetched: self.bodies_fetched.load(Ordering::Relaxed),
            uncles_rewarded: self.uncles_rewarded.load(Ordering::Relaxed),
        }
    }
}
