// Bunched reference index.
//
// Maps an element ID to the sorted IDs that reference it, one store record
// per bunch of 64 IDs. In idle mode every call is a synchronous
// read-modify-write. In linear-import mode `add` only enqueues; a dispatcher
// thread buffers entries per bunch and hands full buffers to a writer
// thread, which loads, merges and re-marshals the touched bunches in
// parallel and commits them as one batch.
//
//   add() --[queue 1024]--> dispatcher --[queue 2]--> writer --> store
//                               ^                        |
//                               +-------[pool 1]---------+

use std::mem;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::{debug, error, info};
use parking_lot::Mutex;
use rayon::prelude::*;

use super::bunch::{IdRefBunch, IdRefBunches, bunch_id, merge_bunch};
use crate::binary::idrefs::{marshal_idrefs_bunch, unmarshal_idrefs_bunch};
use crate::config::BunchOptions;
use crate::element::IdRefs;
use crate::error::{CacheError, Result};
use crate::store::{KvStore, RocksStore, WriteOp, id_to_key};

/// Capacity of the `add` queue in linear-import mode.
const ADD_QUEUE_LEN: usize = 1024;

/// Full buffers waiting for (or being written by) the writer.
const WRITE_QUEUE_LEN: usize = 2;

/// Spare buffers returned by the writer for reuse.
const POOL_LEN: usize = 1;

enum Mode {
    Idle,
    Linear(Pipeline),
}

struct Pipeline {
    add_tx: Sender<(i64, i64)>,
    dispatcher: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Reverse reference index over a [`KvStore`].
pub struct BunchRefIndex {
    store: Arc<dyn KvStore>,
    /// Buffered entries before a hand-off to the writer.
    buffer_entries: usize,
    /// Pre-allocated bunch slots per buffer.
    buffer_bunches: usize,
    mode: Mutex<Mode>,
    err_tx: Sender<CacheError>,
    err_rx: Receiver<CacheError>,
}

impl std::fmt::Debug for BunchRefIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BunchRefIndex")
            .field("buffer_entries", &self.buffer_entries)
            .field("linear_import", &self.is_linear_import())
            .finish_non_exhaustive()
    }
}

impl BunchRefIndex {
    pub fn open(path: &Path, opts: &BunchOptions) -> Result<Self> {
        let store = RocksStore::open(path, &opts.store)?;
        debug!("opened reference index at {}", path.display());
        Ok(Self::with_store(Arc::new(store), opts))
    }

    pub fn with_store(store: Arc<dyn KvStore>, opts: &BunchOptions) -> Self {
        let (err_tx, err_rx) = unbounded();
        Self {
            store,
            buffer_entries: opts.bunch_cache_capacity.max(1),
            buffer_bunches: opts.bunch_size,
            mode: Mutex::new(Mode::Idle),
            err_tx,
            err_rx,
        }
    }

    pub fn is_linear_import(&self) -> bool {
        matches!(*self.mode.lock(), Mode::Linear(_))
    }

    /// Switch between idle and linear-import mode.
    ///
    /// Turning linear import off closes the queue, waits until the
    /// dispatcher and writer have committed everything, and returns the
    /// first error the writer hit since the last drain. Switching to the
    /// current mode does nothing.
    pub fn set_linear_import(&self, on: bool) -> Result<()> {
        let mut mode = self.mode.lock();
        let linear = matches!(*mode, Mode::Linear(_));
        match (linear, on) {
            (false, true) => {
                *mode = Mode::Linear(self.start_pipeline()?);
                info!("reference index linear import on");
                Ok(())
            }
            (true, false) => {
                // lock stays held until the pipeline has drained
                if let Mode::Linear(pipeline) = mem::replace(&mut *mode, Mode::Idle) {
                    pipeline.shutdown()?;
                }
                info!("reference index linear import off");
                self.first_background_error()
            }
            _ => Ok(()),
        }
    }

    /// Drain errors reported by the background writer.
    pub fn take_background_errors(&self) -> Vec<CacheError> {
        self.err_rx.try_iter().collect()
    }

    fn first_background_error(&self) -> Result<()> {
        let mut errors = self.take_background_errors().into_iter();
        match errors.next() {
            None => Ok(()),
            Some(first) => {
                let rest = errors.count();
                if rest > 0 {
                    error!("{rest} more reference index write errors");
                }
                Err(first)
            }
        }
    }

    fn start_pipeline(&self) -> Result<Pipeline> {
        let (add_tx, add_rx) = bounded(ADD_QUEUE_LEN);
        let (write_tx, write_rx) = bounded(WRITE_QUEUE_LEN);
        let (pool_tx, pool_rx) = bounded(POOL_LEN);

        let threshold = self.buffer_entries;
        let slots = self.buffer_bunches;
        let dispatcher = thread::Builder::new()
            .name("refindex-dispatch".into())
            .spawn(move || dispatch(add_rx, write_tx, pool_rx, threshold, slots))?;

        let store = Arc::clone(&self.store);
        let err_tx = self.err_tx.clone();
        let writer = thread::Builder::new()
            .name("refindex-write".into())
            .spawn(move || {
                for mut bunches in write_rx {
                    if let Err(e) = write_refs(store.as_ref(), &bunches) {
                        error!("error while writing reference index: {e}");
                        let _ = err_tx.send(e);
                    }
                    bunches.clear();
                    let _ = pool_tx.try_send(bunches);
                }
            })?;

        Ok(Pipeline {
            add_tx,
            dispatcher,
            writer,
        })
    }

    /// Record that `r` references `id`.
    pub fn add(&self, id: i64, r: i64) -> Result<()> {
        let mode = self.mode.lock();
        match &*mode {
            Mode::Linear(p) => p
                .add_tx
                .send((id, r))
                .map_err(|_| CacheError::Background("linear import pipeline stopped".into())),
            Mode::Idle => self.update(id, |bunch| {
                let idx = match bunch.binary_search_by_key(&id, |e| e.id) {
                    Ok(idx) => idx,
                    Err(idx) => {
                        bunch.insert(idx, IdRefs::new(id));
                        idx
                    }
                };
                bunch[idx].add(r);
            }),
        }
    }

    /// Sorted IDs referencing `id`; empty if none.
    ///
    /// # Panics
    /// In linear-import mode, where buffered writes are not yet visible.
    pub fn get(&self, id: i64) -> Result<Vec<i64>> {
        let mode = self.mode.lock();
        assert_idle(&mode, "get");
        let bunch = self.load(bunch_id(id))?;
        Ok(bunch
            .into_iter()
            .find(|e| e.id == id)
            .map(|e| e.refs)
            .unwrap_or_default())
    }

    /// Remove the reference `r` from `id`. Missing entries are ignored.
    ///
    /// # Panics
    /// In linear-import mode.
    pub fn delete_ref(&self, id: i64, r: i64) -> Result<()> {
        let mode = self.mode.lock();
        assert_idle(&mode, "delete_ref");
        self.update(id, |bunch| {
            if let Ok(idx) = bunch.binary_search_by_key(&id, |e| e.id) {
                bunch[idx].delete(r);
                if bunch[idx].refs.is_empty() {
                    bunch.remove(idx);
                }
            }
        })
    }

    /// Remove all references of `id`. Missing entries are ignored.
    ///
    /// # Panics
    /// In linear-import mode.
    pub fn delete(&self, id: i64) -> Result<()> {
        let mode = self.mode.lock();
        assert_idle(&mode, "delete");
        self.update(id, |bunch| {
            if let Ok(idx) = bunch.binary_search_by_key(&id, |e| e.id) {
                bunch.remove(idx);
            }
        })
    }

    /// Commit buffered writes. In linear-import mode this drains the
    /// pipeline and starts a fresh one.
    pub fn flush(&self) -> Result<()> {
        if self.is_linear_import() {
            let drained = self.set_linear_import(false);
            self.set_linear_import(true)?;
            drained?;
        }
        self.store.flush()
    }

    /// Leave linear import and flush the store.
    pub fn close(self) -> Result<()> {
        self.set_linear_import(false)?;
        self.store.flush()
    }

    // Caller holds the mode lock.
    fn update(&self, id: i64, f: impl FnOnce(&mut Vec<IdRefs>)) -> Result<()> {
        let bid = bunch_id(id);
        let mut bunch = self.load(bid)?;
        f(&mut bunch);
        let key = id_to_key(bid);
        if bunch.is_empty() {
            self.store.delete(&key)
        } else {
            self.store.put(&key, &marshal_idrefs_bunch(&bunch))
        }
    }

    fn load(&self, bid: i64) -> Result<Vec<IdRefs>> {
        load_bunch(self.store.as_ref(), bid)
    }
}

impl Drop for BunchRefIndex {
    fn drop(&mut self) {
        if let Err(e) = self.set_linear_import(false) {
            error!("reference index dropped with failed writes: {e}");
        }
    }
}

#[track_caller]
fn assert_idle(mode: &Mode, op: &str) {
    if matches!(mode, Mode::Linear(_)) {
        panic!("BunchRefIndex::{op} called during linear import");
    }
}

impl Pipeline {
    /// Close the queue, then wait for the dispatcher and the writer in turn.
    fn shutdown(self) -> Result<()> {
        drop(self.add_tx);
        self.dispatcher
            .join()
            .map_err(|_| CacheError::Background("dispatcher thread panicked".into()))?;
        self.writer
            .join()
            .map_err(|_| CacheError::Background("writer thread panicked".into()))
    }
}

// ---------------------------------------------------------------------------
// Background stages
// ---------------------------------------------------------------------------

fn dispatch(
    add_rx: Receiver<(i64, i64)>,
    write_tx: Sender<IdRefBunches>,
    pool_rx: Receiver<IdRefBunches>,
    threshold: usize,
    slots: usize,
) {
    let mut buf = IdRefBunches::with_capacity(slots);
    for (id, r) in add_rx {
        buf.add(id, r);
        if buf.len() >= threshold {
            let fresh = pool_rx
                .try_recv()
                .unwrap_or_else(|_| IdRefBunches::with_capacity(slots));
            let full = mem::replace(&mut buf, fresh);
            debug!(
                "handing {} entries in {} bunches to writer",
                full.len(),
                full.bunch_count()
            );
            if write_tx.send(full).is_err() {
                return;
            }
        }
    }
    if !buf.is_empty() {
        let _ = write_tx.send(buf);
    }
}

/// Merge every buffered bunch with its stored version and commit them all
/// in one batch.
pub(crate) fn write_refs(store: &dyn KvStore, bunches: &IdRefBunches) -> Result<()> {
    let ops = bunches
        .iter()
        .par_bridge()
        .map(|bunch| load_merge_marshal(store, bunch))
        .collect::<Result<Vec<_>>>()?;
    store.write_batch(ops)
}

fn load_merge_marshal(store: &dyn KvStore, bunch: &IdRefBunch) -> Result<WriteOp> {
    let old = load_bunch(store, bunch.id)?;
    let merged = merge_bunch(old, &bunch.idrefs);
    let key = id_to_key(bunch.id).to_vec();
    Ok(if merged.is_empty() {
        WriteOp::Delete(key)
    } else {
        WriteOp::Put(key, marshal_idrefs_bunch(&merged))
    })
}

fn load_bunch(store: &dyn KvStore, bid: i64) -> Result<Vec<IdRefs>> {
    match store.get(&id_to_key(bid))? {
        Some(data) => unmarshal_idrefs_bunch(&data),
        None => Ok(Vec::new()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
