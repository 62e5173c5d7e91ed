//! Forward walk over the header column yielding only canonical headers.
//!
//! The header column holds every header ever stored, keyed `number ‖ hash`, including
//! headers of abandoned forks. For each height the scanner keeps only the entry whose
//! hash matches the canonical pointer, so fork data never reaches the fold.

use ledgersync_chainstate::{block_number_key, decode_header_key, ChainError, ChainIndex};
use ledgersync_consensus::Hash256;
use ledgersync_primitives::{DecodeError, Header};
use ledgersync_storage::{Column, Cursor, KeyValueStore};

use crate::metrics::IssuanceMetrics;

#[derive(Clone, Debug)]
pub struct CanonicalHeader {
    pub number: u64,
    pub hash: Hash256,
    pub header: Header,
}

#[derive(Debug)]
pub enum ScanError {
    Chain(ChainError),
    /// The canonical header at `number` is stored but malformed.
    Decode {
        number: u64,
        hash: Hash256,
        error: DecodeError,
    },
}

impl From<ChainError> for ScanError {
    fn from(err: ChainError) -> Self {
        ScanError::Chain(err)
    }
}

pub struct CanonicalScanner<'a, S: ?Sized> {
    cursor: Cursor<'a, S>,
    index: ChainIndex<'a, S>,
    target: u64,
    metrics: Option<&'a IssuanceMetrics>,
    canonical: Option<(u64, Option<Hash256>)>,
    done: bool,
}

impl<'a, S: KeyValueStore + ?Sized> CanonicalScanner<'a, S> {
    /// Scans heights `from..=target`.
    pub fn new(store: &'a S, from: u64, target: u64) -> Self {
        Self {
            cursor: Cursor::seek(store, Column::Headers, &block_number_key(from)),
            index: ChainIndex::new(store),
            target,
            metrics: None,
            canonical: None,
            done: from > target,
        }
    }

    pub fn with_metrics(mut self, metrics: &'a IssuanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Canonical hash at `number`, looked up once per height.
    fn canonical_hash(&mut self, number: u64) -> Result<Option<Hash256>, ChainError> {
        if let Some((cached_number, hash)) = self.canonical {
            if cached_number == number {
                return Ok(hash);
            }
        }
        let hash = self.index.canonical_hash(number)?;
        self.canonical = Some((number, hash));
        Ok(hash)
    }

    fn fail(&mut self, err: ScanError) -> Option<Result<CanonicalHeader, ScanError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<S: KeyValueStore + ?Sized> Iterator for CanonicalScanner<'_, S> {
    type Item = Result<CanonicalHeader, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let (key, value) = match self.cursor.next()? {
                Ok(entry) => entry,
                Err(err) => return self.fail(ScanError::Chain(err.into())),
            };
            let Some((number, hash)) = decode_header_key(&key) else {
                if let Some(metrics) = self.metrics {
                    metrics.record_foreign_key();
                }
                continue;
            };
            if number > self.target {
                self.done = true;
                return None;
            }
            let canonical = match self.canonical_hash(number) {
                Ok(canonical) => canonical,
                Err(err) => return self.fail(err.into()),
            };
            if canonical != Some(hash) {
                if let Some(metrics) = self.metrics {
                    metrics.record_fork_header();
                }
                continue;
            }
            return match Header::decode(&value) {
                Ok(header) => Some(Ok(CanonicalHeader {
                    number,
                    hash,
                    header,
                })),
                Err(error) => self.fail(ScanError::Decode {
                    number,
                    hash,
                    error,
                }),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_chainstate::header_key;
    use ledgersync_primitives::empty_uncle_hash;
    use ledgersync_storage::memory::MemoryStore;
    use ledgersync_storage::WriteBatch;
    use primitive_types::U256;

    fn header(number: u64, tag: u8) -> Header {
        Header {
            parent_hash: [tag; 32],
            uncle_hash: empty_uncle_hash(),
            coinbase: [tag; 20],
            number,
            difficulty: U256::from(2u64),
            gas_limit: 1_000,
            gas_used: 0,
            time: number,
            extra: Vec::new(),
            base_fee: None,
        }
    }

    fn numbers(scanner: CanonicalScanner<'_, MemoryStore>) -> Vec<u64> {
        scanner
            .map(|item| item.expect("scan").number)
            .collect()
    }

    #[test]
    fn yields_canonical_headers_in_range() {
        let store = MemoryStore::new();
        let index = ChainIndex::new(&store);
        let mut batch = WriteBatch::new();
        for number in 0..=6 {
            let hash = index.put_header(&mut batch, &header(number, 1));
            index.set_canonical_hash(&mut batch, number, &hash);
            index.put_header(&mut batch, &header(number, 2));
        }
        store.write_batch(&batch).expect("commit");
        batch = WriteBatch::new();
        batch.put(Column::Headers, [0u8, 0, 0, 0, 0, 0, 0, 3], b"short".to_vec());
        store.write_batch(&batch).expect("commit");

        let metrics = IssuanceMetrics::new();
        let scanner = CanonicalScanner::new(&store, 2, 5).with_metrics(&metrics);
        assert_eq!(numbers(scanner), vec![2, 3, 4, 5]);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.foreign_keys_skipped, 1);
        assert!(snapshot.fork_headers_skipped >= 4);
    }

    #[test]
    fn empty_range_yields_nothing() {
        let store = MemoryStore::new();
        assert!(numbers(CanonicalScanner::new(&store, 4, 3)).is_empty());
    }

    #[test]
    fn malformed_canonical_header_ends_scan_with_error() {
        let store = MemoryStore::new();
        let index = ChainIndex::new(&store);
        let mut batch = WriteBatch::new();
        let good = index.put_header(&mut batch, &header(1, 1));
        index.set_canonical_hash(&mut batch, 1, &good);
        let bad_hash = [9u8; 32];
        batch.put(Column::Headers, header_key(2, &bad_hash), vec![0u8; 4]);
        index.set_canonical_hash(&mut batch, 2, &bad_hash);
        let next = index.put_header(&mut batch, &header(3, 1));
        index.set_canonical_hash(&mut batch, 3, &next);
        store.write_batch(&batch).expect("commit");

        let mut scanner = CanonicalScanner::new(&store, 1, 3);
        assert_eq!(scanner.next().expect("first").expect("ok").number, 1);
        match scanner.next() {
            Some(Err(ScanError::Decode { number, hash, .. })) => {
                assert_eq!(number, 2);
                assert_eq!(hash, bad_hash);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
        assert!(scanner.next().is_none());
    }
}
