// RocksDB backend.

use std::path::Path;

use log::debug;
use rocksdb::{BlockBasedOptions, Cache, DB, IteratorMode, Options, WriteBatch};

use super::{KvIter, KvStore, WriteOp};
use crate::config::StoreOptions;
use crate::error::{CacheError, Result};

const MIB: usize = 1024 * 1024;

/// A RocksDB database in its own directory. Dropping it closes the database.
pub struct RocksStore {
    db: DB,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .finish()
    }
}

impl RocksStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path, opts: &StoreOptions) -> Result<Self> {
        let db = DB::open(&engine_options(opts), path)?;
        debug!("opened store {} ({opts:?})", path.display());
        Ok(Self { db })
    }
}

fn engine_options(opts: &StoreOptions) -> Options {
    let mut options = Options::default();
    options.create_if_missing(true);

    let mut table = BlockBasedOptions::default();
    if opts.cache_size_mb > 0 {
        let cache = Cache::new_lru_cache(opts.cache_size_mb * MIB);
        table.set_block_cache(&cache);
    }
    if opts.block_size_kb > 0 {
        table.set_block_size(opts.block_size_kb * 1024);
    }
    if opts.block_restart_interval > 0 {
        table.set_block_restart_interval(opts.block_restart_interval);
    }
    options.set_block_based_table_factory(&table);

    if opts.write_buffer_size_mb > 0 {
        options.set_write_buffer_size(opts.write_buffer_size_mb * MIB);
    }
    if opts.max_open_files > 0 {
        options.set_max_open_files(opts.max_open_files);
    }
    options
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Ok(self.db.put(key, value)?)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        Ok(self.db.delete(key)?)
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Put(k, v) => batch.put(k, v),
                WriteOp::Delete(k) => batch.delete(k),
            }
        }
        Ok(self.db.write(batch)?)
    }

    fn iter(&self) -> KvIter<'_> {
        Box::new(
            self.db
                .iterator(IteratorMode::Start)
                .map(|item| {
                    item.map(|(k, v)| (k.into_vec(), v.into_vec()))
                        .map_err(CacheError::from)
                }),
        )
    }

    fn flush(&self) -> Result<()> {
        Ok(self.db.flush()?)
    }
}
