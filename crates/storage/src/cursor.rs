use crate::{key_successor, Column, KeyValue, KeyValueStore, StoreError};

/// Forward cursor over one column, starting at the first key `>= start`.
///
/// Each step re-seeks just past the previously returned key, so no backend lock or
/// snapshot is held between items and entries staged by the same transaction are seen.
/// The cursor fuses after the end of the column or the first error.
pub struct Cursor<'a, S: ?Sized> {
    store: &'a S,
    column: Column,
    next_key: Option<Vec<u8>>,
}

impl<'a, S: KeyValueStore + ?Sized> Cursor<'a, S> {
    pub fn seek(store: &'a S, column: Column, start: &[u8]) -> Self {
        Self {
            store,
            column,
            next_key: Some(start.to_vec()),
        }
    }
}

impl<S: KeyValueStore + ?Sized> Iterator for Cursor<'_, S> {
    type Item = Result<KeyValue, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let from = self.next_key.take()?;
        match self.store.seek(self.column, &from) {
            Ok(Some((key, value))) => {
                self.next_key = Some(key_successor(&key));
                Some(Ok((key, value)))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
