// Bunched coordinate cache.
//
// Nodes are grouped into bunches of `bunch_size` consecutive IDs; each bunch
// is one delta-node record. Recently used bunches stay decoded in an LRU and
// are written back when evicted or flushed.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hashlink::LruCache;
use log::{debug, info};
use parking_lot::Mutex;

use crate::binary::deltacoords::{marshal_delta_nodes, unmarshal_delta_nodes};
use crate::config::BunchOptions;
use crate::element::{Node, SKIP, Way};
use crate::error::{CacheError, Result};
use crate::store::{KvStore, RocksStore, WriteOp, id_to_key, key_to_id};

/// Spare node buffers kept for reuse after eviction.
const MAX_FREE_BUFFERS: usize = 64;

#[derive(Debug)]
struct CoordsBunch {
    /// Sorted by ID, unique.
    coords: Vec<Node>,
    needs_write: bool,
}

#[derive(Debug)]
struct BunchTable {
    lru: LruCache<i64, CoordsBunch>,
    free: Vec<Vec<Node>>,
}

pub struct DeltaCoordsCache {
    store: Arc<dyn KvStore>,
    table: Mutex<BunchTable>,
    bunch_size: i64,
    capacity: usize,
    linear_import: AtomicBool,
}

impl std::fmt::Debug for DeltaCoordsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaCoordsCache")
            .field("bunch_size", &self.bunch_size)
            .field("capacity", &self.capacity)
            .field("linear_import", &self.is_linear_import())
            .finish_non_exhaustive()
    }
}

impl DeltaCoordsCache {
    pub fn open(path: &Path, opts: &BunchOptions) -> Result<Self> {
        let store = RocksStore::open(path, &opts.store)?;
        debug!("opened delta coords cache at {}", path.display());
        Ok(Self::with_store(
            Arc::new(store),
            opts.bunch_size,
            opts.bunch_cache_capacity,
        ))
    }

    /// `bunch_size` coordinates per record, at most `capacity` decoded
    /// bunches in memory. Both are clamped to at least one.
    pub fn with_store(store: Arc<dyn KvStore>, bunch_size: usize, capacity: usize) -> Self {
        Self {
            store,
            table: Mutex::new(BunchTable {
                lru: LruCache::new_unbounded(),
                free: Vec::new(),
            }),
            bunch_size: bunch_size.max(1) as i64,
            capacity: capacity.max(1),
            linear_import: AtomicBool::new(false),
        }
    }

    /// In linear-import mode `put_coords` writes bunches that lie strictly
    /// inside its input directly, without reading the stored bunch first.
    /// Only valid while each call covers an ID range no other call touches.
    pub fn set_linear_import(&self, on: bool) {
        info!("delta coords cache linear import {}", if on { "on" } else { "off" });
        self.linear_import.store(on, Ordering::Relaxed);
    }

    pub fn is_linear_import(&self) -> bool {
        self.linear_import.load(Ordering::Relaxed)
    }

    #[inline]
    fn bunch_id(&self, id: i64) -> i64 {
        id / self.bunch_size
    }

    /// Store coordinates. `nodes` must be sorted by ID; for repeated IDs the
    /// later entry wins. `SKIP` nodes are dropped and tags are not stored.
    /// Returns the number of nodes taken.
    pub fn put_coords(&self, nodes: &[Node]) -> Result<usize> {
        let nodes: Vec<&Node> = nodes.iter().filter(|n| n.id != SKIP).collect();
        let linear = self.is_linear_import();
        let mut direct = Vec::new();

        let mut start = 0;
        while start < nodes.len() {
            let bunch_id = self.bunch_id(nodes[start].id);
            let end = nodes[start..]
                .iter()
                .position(|n| self.bunch_id(n.id) != bunch_id)
                .map_or(nodes.len(), |p| start + p);
            let group = &nodes[start..end];

            let interior = start > 0 && end < nodes.len();
            if linear && interior && !self.table.lock().lru.contains_key(&bunch_id) {
                let mut coords: Vec<Node> = group.iter().map(|n| strip(n)).collect();
                sort_dedup(&mut coords);
                direct.push(WriteOp::Put(
                    id_to_key(bunch_id).to_vec(),
                    marshal_delta_nodes(&coords, Vec::new()),
                ));
            } else {
                self.with_bunch(bunch_id, |bunch| {
                    bunch.coords.extend(group.iter().map(|n| strip(n)));
                    sort_dedup(&mut bunch.coords);
                    bunch.needs_write = true;
                })?;
            }
            start = end;
        }
        self.store.write_batch(direct)?;
        Ok(nodes.len())
    }

    /// Coordinate of node `id`, or `NotFound`.
    pub fn get_coord(&self, id: i64) -> Result<Node> {
        self.with_bunch(self.bunch_id(id), |bunch| {
            bunch
                .coords
                .binary_search_by_key(&id, |n| n.id)
                .map(|idx| bunch.coords[idx].clone())
                .map_err(|_| CacheError::NotFound)
        })?
    }

    /// Remove node `id`. Absent IDs are ignored.
    pub fn delete_coord(&self, id: i64) -> Result<()> {
        self.with_bunch(self.bunch_id(id), |bunch| {
            if let Ok(idx) = bunch.coords.binary_search_by_key(&id, |n| n.id) {
                bunch.coords.remove(idx);
                bunch.needs_write = true;
            }
        })
    }

    /// Resolve every ref of `way` into `way.nodes`.
    pub fn fill_way(&self, way: &mut Way) -> Result<()> {
        let mut nodes = Vec::with_capacity(way.refs.len());
        for &id in &way.refs {
            nodes.push(self.get_coord(id)?);
        }
        way.nodes = nodes;
        Ok(())
    }

    /// Write back every modified bunch in one batch.
    pub fn flush(&self) -> Result<()> {
        let mut table = self.table.lock();
        let mut ops = Vec::new();
        for (&bunch_id, bunch) in table.lru.iter_mut() {
            if bunch.needs_write {
                ops.push(write_op(bunch_id, &bunch.coords));
                bunch.needs_write = false;
            }
        }
        debug!("flushing {} coord bunches", ops.len());
        self.store.write_batch(ops)
    }

    /// All stored coordinates in ascending ID order. Pending bunches are
    /// flushed first.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<Node>> + '_> {
        self.flush()?;
        Ok(self.store.iter().flat_map(|item| {
            let decoded = item.and_then(|(key, value)| {
                key_to_id(&key)?;
                unmarshal_delta_nodes(&value, Vec::new())
            });
            match decoded {
                Ok(nodes) => nodes.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            }
        }))
    }

    pub fn close(self) -> Result<()> {
        self.flush()?;
        self.store.flush()
    }

    // -----------------------------------------------------------------------
    // Bunch table
    // -----------------------------------------------------------------------

    /// Run `f` on the cached bunch, loading it from the store first if
    /// needed. Evicted bunches are written back before returning.
    fn with_bunch<R>(&self, bunch_id: i64, f: impl FnOnce(&mut CoordsBunch) -> R) -> Result<R> {
        let mut guard = self.table.lock();
        let table = &mut *guard;

        if let Some(bunch) = table.lru.get_mut(&bunch_id) {
            return Ok(f(bunch));
        }

        let buf = table.free.pop().unwrap_or_default();
        let coords = match self.store.get(&id_to_key(bunch_id))? {
            Some(data) => unmarshal_delta_nodes(&data, buf)?,
            None => {
                let mut buf = buf;
                buf.clear();
                buf
            }
        };
        let mut bunch = CoordsBunch {
            coords,
            needs_write: false,
        };
        let result = f(&mut bunch);
        table.lru.insert(bunch_id, bunch);

        let mut evicted = Vec::new();
        while table.lru.len() > self.capacity {
            let Some((id, mut old)) = table.lru.remove_lru() else {
                break;
            };
            if old.needs_write {
                evicted.push(write_op(id, &old.coords));
            }
            if table.free.len() < MAX_FREE_BUFFERS {
                old.coords.clear();
                table.free.push(old.coords);
            }
        }
        self.store.write_batch(evicted)?;
        Ok(result)
    }
}

fn strip(n: &Node) -> Node {
    Node::new(n.id, n.long, n.lat)
}

/// Sort by ID, keeping the last of equal IDs.
fn sort_dedup(coords: &mut Vec<Node>) {
    coords.reverse();
    coords.sort_by_key(|n| n.id);
    coords.dedup_by_key(|n| n.id);
}

fn write_op(bunch_id: i64, coords: &[Node]) -> WriteOp {
    let key = id_to_key(bunch_id).to_vec();
    if coords.is_empty() {
        WriteOp::Delete(key)
    } else {
        WriteOp::Put(key, marshal_delta_nodes(coords, Vec::new()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
