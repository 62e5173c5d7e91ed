//! Overlay transactions and the optional ambient transaction scope.
//!
//! A [`Transaction`] stages puts and deletes in memory on top of a base store. Reads merge
//! the staged set with the base, so code running inside a transaction observes its own
//! writes. Nothing reaches the base store until [`Transaction::commit`]; dropping the
//! transaction discards every staged change.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{key_successor, Column, KeyValue, KeyValueStore, StoreError, WriteBatch, WriteOp};

/// `None` marks a staged delete.
type Staged = BTreeMap<(Column, Vec<u8>), Option<Vec<u8>>>;

pub struct Transaction<S> {
    store: S,
    staged: RwLock<Staged>,
}

impl<S: KeyValueStore> Transaction<S> {
    pub fn begin(store: S) -> Self {
        Self {
            store,
            staged: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn commit(self) -> Result<(), StoreError> {
        let staged = self
            .staged
            .into_inner()
            .map_err(|_| StoreError::Backend("transaction lock poisoned".to_string()))?;
        if staged.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for ((column, key), value) in staged {
            match value {
                Some(value) => batch.put(column, key, value),
                None => batch.delete(column, key),
            }
        }
        self.store.write_batch(&batch)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Staged>, StoreError> {
        self.staged
            .read()
            .map_err(|_| StoreError::Backend("transaction lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Staged>, StoreError> {
        self.staged
            .write()
            .map_err(|_| StoreError::Backend("transaction lock poisoned".to_string()))
    }
}

impl<S: KeyValueStore> KeyValueStore for Transaction<S> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(staged) = self.read()?.get(&(column, key.to_vec())) {
            return Ok(staged.clone());
        }
        self.store.get(column, key)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write()?
            .insert((column, key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.write()?.insert((column, key.to_vec()), None);
        Ok(())
    }

    fn seek(&self, column: Column, from: &[u8]) -> Result<Option<KeyValue>, StoreError> {
        let staged = self.read()?;
        let mut from = from.to_vec();
        loop {
            let base = self.store.seek(column, &from)?;
            let overlay = staged
                .range((column, from.clone())..)
                .next()
                .filter(|((entry_column, _), _)| *entry_column == column);
            let Some(((_, staged_key), staged_value)) = overlay else {
                return Ok(base);
            };
            if let Some((base_key, _)) = &base {
                if base_key < staged_key {
                    return Ok(base);
                }
            }
            match staged_value {
                Some(value) => return Ok(Some((staged_key.clone(), value.clone()))),
                None => from = key_successor(staged_key),
            }
        }
    }

    fn seek_before(&self, column: Column, key: &[u8]) -> Result<Option<KeyValue>, StoreError> {
        let staged = self.read()?;
        let mut before = key.to_vec();
        loop {
            let base = self.store.seek_before(column, &before)?;
            let lower = Bound::Included((column, Vec::new()));
            let upper = Bound::Excluded((column, before.clone()));
            let overlay = staged.range((lower, upper)).next_back();
            let Some(((_, staged_key), staged_value)) = overlay else {
                return Ok(base);
            };
            if let Some((base_key, _)) = &base {
                if base_key > staged_key {
                    return Ok(base);
                }
            }
            match staged_value {
                Some(value) => return Ok(Some((staged_key.clone(), value.clone()))),
                None => before = staged_key.clone(),
            }
        }
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut staged = self.write()?;
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    staged.insert(
                        (*column, key.as_slice().to_vec()),
                        Some(value.as_slice().to_vec()),
                    );
                }
                WriteOp::Delete { column, key } => {
                    staged.insert((*column, key.as_slice().to_vec()), None);
                }
            }
        }
        Ok(())
    }
}

/// A transaction that is either borrowed from the caller or opened (and owned) here.
///
/// Only an owned scope is ever finalized: [`TxScope::finish`] commits it, and dropping it
/// without finishing discards its writes. A borrowed transaction is left untouched for
/// its owner to commit or discard.
pub enum TxScope<'t, S> {
    Owned(Transaction<S>),
    Borrowed(&'t Transaction<S>),
}

impl<'t, S: KeyValueStore> TxScope<'t, S> {
    pub fn open(store: S, external: Option<&'t Transaction<S>>) -> Self {
        match external {
            Some(tx) => TxScope::Borrowed(tx),
            None => TxScope::Owned(Transaction::begin(store)),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, TxScope::Owned(_))
    }

    pub fn tx(&self) -> &Transaction<S> {
        match self {
            TxScope::Owned(tx) => tx,
            TxScope::Borrowed(tx) => tx,
        }
    }

    pub fn finish(self) -> Result<(), StoreError> {
        match self {
            TxScope::Owned(tx) => tx.commit(),
            TxScope::Borrowed(_) => Ok(()),
        }
    }
}
