// Element caches.
//
// One store per element kind, keyed by `id_to_key(id)`. Values never contain
// the ID: `get` and iteration restore it from the key.

mod coords;
mod delta;
mod osm;

pub use coords::CoordsCache;
pub use delta::DeltaCoordsCache;
pub use osm::OsmCache;

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::binary::serialize;
use crate::config::StoreOptions;
use crate::element::{Member, MemberType, Node, Relation, SKIP, Way};
use crate::error::{CacheError, Result};
use crate::store::{KvIter, KvStore, RocksStore, WriteOp, id_to_key, key_to_id};

// ---------------------------------------------------------------------------
// Record trait
// ---------------------------------------------------------------------------

/// An element that can be stored in an [`ElementCache`].
pub trait Record: Sized {
    /// Element kind, for log messages.
    const KIND: &'static str;

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Whether the element should be persisted at all.
    fn is_cacheable(&self) -> bool;

    fn marshal(&self) -> Vec<u8>;

    fn unmarshal(data: &[u8]) -> Result<Self>;
}

impl Record for Node {
    const KIND: &'static str = "node";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    /// Untagged nodes only live in the coordinate cache.
    fn is_cacheable(&self) -> bool {
        self.id != SKIP && !self.tags.is_empty()
    }

    fn marshal(&self) -> Vec<u8> {
        serialize::marshal_node(self)
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        serialize::unmarshal_node(data)
    }
}

impl Record for Way {
    const KIND: &'static str = "way";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn is_cacheable(&self) -> bool {
        self.id != SKIP
    }

    fn marshal(&self) -> Vec<u8> {
        serialize::marshal_way(self)
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        serialize::unmarshal_way(data)
    }
}

impl Record for Relation {
    const KIND: &'static str = "relation";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn is_cacheable(&self) -> bool {
        self.id != SKIP && !self.tags.is_empty()
    }

    fn marshal(&self) -> Vec<u8> {
        serialize::marshal_relation(self)
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        serialize::unmarshal_relation(data)
    }
}

// ---------------------------------------------------------------------------
// ElementCache
// ---------------------------------------------------------------------------

/// Typed cache of one element kind.
pub struct ElementCache<T> {
    store: Arc<dyn KvStore>,
    _kind: PhantomData<fn() -> T>,
}

pub type NodesCache = ElementCache<Node>;
pub type WaysCache = ElementCache<Way>;
pub type RelationsCache = ElementCache<Relation>;

impl<T> std::fmt::Debug for ElementCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementCache").finish_non_exhaustive()
    }
}

impl<T: Record> ElementCache<T> {
    /// Open (or create) a RocksDB-backed cache at `path`.
    pub fn open(path: &Path, opts: &StoreOptions) -> Result<Self> {
        let store = RocksStore::open(path, opts)?;
        debug!("opened {} cache at {}", T::KIND, path.display());
        Ok(Self::with_store(Arc::new(store)))
    }

    pub fn with_store(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    /// Store `elem`. Elements that are not cacheable are silently ignored.
    pub fn put(&self, elem: &T) -> Result<()> {
        if !elem.is_cacheable() {
            return Ok(());
        }
        self.store.put(&id_to_key(elem.id()), &elem.marshal())
    }

    /// Store all cacheable `elems` in one atomic batch and return how many
    /// were written.
    pub fn put_batch(&self, elems: &[T]) -> Result<usize> {
        let ops: Vec<WriteOp> = elems
            .iter()
            .filter(|e| e.is_cacheable())
            .map(|e| WriteOp::Put(id_to_key(e.id()).to_vec(), e.marshal()))
            .collect();
        let written = ops.len();
        self.store.write_batch(ops)?;
        Ok(written)
    }

    /// Fetch element `id`, or `NotFound`.
    pub fn get(&self, id: i64) -> Result<T> {
        let data = self
            .store
            .get(&id_to_key(id))?
            .ok_or(CacheError::NotFound)?;
        let mut elem = T::unmarshal(&data)?;
        elem.set_id(id);
        Ok(elem)
    }

    /// Remove element `id`. Absent IDs are ignored.
    pub fn delete(&self, id: i64) -> Result<()> {
        self.store.delete(&id_to_key(id))
    }

    /// All cached elements in ascending ID order.
    pub fn iter(&self) -> CacheIter<'_, T> {
        CacheIter {
            inner: self.store.iter(),
            _kind: PhantomData,
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Flush and release the store.
    pub fn close(self) -> Result<()> {
        self.store.flush()
    }
}

impl ElementCache<Way> {
    /// Attach the cached way to every way member.
    pub fn fill_members(&self, members: &mut [Member]) -> Result<()> {
        for m in members.iter_mut().filter(|m| m.kind == MemberType::Way) {
            m.way = Some(Box::new(self.get(m.id)?));
        }
        Ok(())
    }
}

/// Iterator over an [`ElementCache`]. Holds a borrow of the cache, so the
/// underlying engine iterator is gone before the cache can be closed.
pub struct CacheIter<'a, T> {
    inner: KvIter<'a>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Record> Iterator for CacheIter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(item.and_then(|(key, value)| {
            let mut elem = T::unmarshal(&value)?;
            elem.set_id(key_to_id(&key)?);
            Ok(elem)
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
