use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{Column, KeyValue, KeyValueStore, StoreError, WriteBatch, WriteOp};

type MemoryStoreMap = BTreeMap<(Column, Vec<u8>), Vec<u8>>;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, column: Column) -> Result<usize, StoreError> {
        let guard = self.read()?;
        Ok(guard.keys().filter(|(entry_column, _)| *entry_column == column).count())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreMap>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreMap>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.read()?;
        Ok(guard.get(&(column, key.to_vec())).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        guard.insert((column, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        guard.remove(&(column, key.to_vec()));
        Ok(())
    }

    fn seek(&self, column: Column, from: &[u8]) -> Result<Option<KeyValue>, StoreError> {
        let guard = self.read()?;
        let entry = guard
            .range((column, from.to_vec())..)
            .next()
            .filter(|((entry_column, _), _)| *entry_column == column)
            .map(|((_, key), value)| (key.clone(), value.clone()));
        Ok(entry)
    }

    fn seek_before(&self, column: Column, key: &[u8]) -> Result<Option<KeyValue>, StoreError> {
        let guard = self.read()?;
        let lower = Bound::Included((column, Vec::new()));
        let upper = Bound::Excluded((column, key.to_vec()));
        let entry = guard
            .range((lower, upper))
            .next_back()
            .map(|((_, key), value)| (key.clone(), value.clone()));
        Ok(entry)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    guard.insert(
                        (*column, key.as_slice().to_vec()),
                        value.as_slice().to_vec(),
                    );
                }
                WriteOp::Delete { column, key } => {
                    guard.remove(&(*column, key.as_slice().to_vec()));
                }
            }
        }
        Ok(())
    }
}
