// Ordered key-value storage behind every cache.
//
// Caches only need point reads, point writes, atomic batches and a full
// scan in key order, so the engine is hidden behind `KvStore`. `RocksStore`
// is the on-disk backend, `MemoryStore` keeps everything in a BTreeMap.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::error::{CacheError, Result};

/// Byte length of every element and bunch key.
pub const KEY_LEN: usize = 8;

/// A single mutation inside a [`KvStore::write_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Key/value pair yielded by [`KvStore::iter`].
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Lazy scan over a store in ascending key order.
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<KvPair>> + 'a>;

/// Ordered key-value engine.
///
/// Implementations serialise conflicting writes internally; callers that need
/// read-modify-write atomicity must lock around it themselves.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Apply all operations as one unit, in order.
    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Scan all records in key order.
    ///
    /// The iterator borrows the store, so it is always released before the
    /// store can be dropped.
    fn iter(&self) -> KvIter<'_>;

    /// Persist buffered writes.
    fn flush(&self) -> Result<()>;
}

/// Encode an ID so that byte order matches numeric order, negatives included.
#[inline]
pub fn id_to_key(id: i64) -> [u8; KEY_LEN] {
    ((id as u64) ^ (1 << 63)).to_be_bytes()
}

/// Inverse of [`id_to_key`].
pub fn key_to_id(key: &[u8]) -> Result<i64> {
    let raw: [u8; KEY_LEN] = key
        .try_into()
        .map_err(|_| CacheError::corrupt(format!("key has {} bytes, expected 8", key.len())))?;
    Ok((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_matches_id_order() {
        let ids = [i64::MIN, -1000, -1, 0, 1, 63, 64, 1 << 40, i64::MAX];
        for w in ids.windows(2) {
            assert!(id_to_key(w[0]) < id_to_key(w[1]), "{} vs {}", w[0], w[1]);
        }
    }

    #[test]
    fn key_roundtrip() {
        for id in [i64::MIN, -1, 0, 42, i64::MAX] {
            assert_eq!(key_to_id(&id_to_key(id)).unwrap(), id);
        }
        assert!(key_to_id(&[1, 2, 3]).is_err());
    }

    #[test]
    fn positive_keys_are_big_endian_with_top_bit() {
        assert_eq!(id_to_key(1), [0x80, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(id_to_key(-1), [0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }
}
