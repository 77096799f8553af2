// Per-node coordinate cache storing raw doubles.

use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::binary::serialize::{marshal_coord, unmarshal_coord};
use crate::config::StoreOptions;
use crate::element::{Node, SKIP, Way};
use crate::error::{CacheError, Result};
use crate::store::{KvStore, RocksStore, WriteOp, id_to_key, key_to_id};

/// One record per node, no precision loss. Tags are dropped.
pub struct CoordsCache {
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for CoordsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordsCache").finish_non_exhaustive()
    }
}

impl CoordsCache {
    pub fn open(path: &Path, opts: &StoreOptions) -> Result<Self> {
        let store = RocksStore::open(path, opts)?;
        debug!("opened coords cache at {}", path.display());
        Ok(Self::with_store(Arc::new(store)))
    }

    pub fn with_store(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn put_coord(&self, node: &Node) -> Result<()> {
        if node.id == SKIP {
            return Ok(());
        }
        self.store
            .put(&id_to_key(node.id), &marshal_coord(node.long, node.lat))
    }

    /// Store all nodes in one batch; returns how many were written.
    pub fn put_coords(&self, nodes: &[Node]) -> Result<usize> {
        let ops: Vec<WriteOp> = nodes
            .iter()
            .filter(|n| n.id != SKIP)
            .map(|n| WriteOp::Put(id_to_key(n.id).to_vec(), marshal_coord(n.long, n.lat)))
            .collect();
        let written = ops.len();
        self.store.write_batch(ops)?;
        Ok(written)
    }

    pub fn get_coord(&self, id: i64) -> Result<Node> {
        let data = self
            .store
            .get(&id_to_key(id))?
            .ok_or(CacheError::NotFound)?;
        let (long, lat) = unmarshal_coord(&data)?;
        Ok(Node::new(id, long, lat))
    }

    pub fn delete_coord(&self, id: i64) -> Result<()> {
        self.store.delete(&id_to_key(id))
    }

    /// Resolve every ref of `way` into `way.nodes`. Fails on the first
    /// missing coordinate.
    pub fn fill_way(&self, way: &mut Way) -> Result<()> {
        way.nodes = way
            .refs
            .iter()
            .map(|&id| self.get_coord(id))
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// All coordinates in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Node>> + '_ {
        self.store.iter().map(|item| {
            let (key, value) = item?;
            let (long, lat) = unmarshal_coord(&value)?;
            Ok(Node::new(key_to_id(&key)?, long, lat))
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn close(self) -> Result<()> {
        self.store.flush()
    }
}
