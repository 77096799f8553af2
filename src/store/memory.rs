// In-memory backend.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{KvIter, KvStore, WriteOp};
use crate::error::Result;

/// `KvStore` over a `BTreeMap`. Iteration works on a snapshot taken when
/// the iterator is created.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.map.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut map = self.map.write();
        for op in ops {
            match op {
                WriteOp::Put(k, v) => {
                    map.insert(k, v);
                }
                WriteOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn iter(&self) -> KvIter<'_> {
        let snapshot: Vec<_> = self
            .map
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(snapshot.into_iter().map(Ok))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_applies_in_order() {
        let store = MemoryStore::new();
        store
            .write_batch(vec![
                WriteOp::Put(b"b".to_vec(), b"1".to_vec()),
                WriteOp::Delete(b"b".to_vec()),
                WriteOp::Put(b"a".to_vec(), b"2".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(b"a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), None);
    }

    #[test]
    fn iter_is_sorted() {
        let store = MemoryStore::new();
        for k in [b"c", b"a", b"b"] {
            store.put(k, k).unwrap();
        }
        let keys: Vec<_> = store.iter().map(|r| r.unwrap().0).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}
