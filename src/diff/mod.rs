// Reference indexes for diff imports.
//
// A diff touching node N must rebuild every way using N and every relation
// containing N or one of those ways. `DiffCache` keeps the three reverse
// indexes that answer this without scanning the element caches.

mod bunch;
mod index;
mod typed;

pub use bunch::{BUNCH_ID_WIDTH, IdRefBunch, IdRefBunches, bunch_id, merge_bunch};
pub use index::BunchRefIndex;
pub use typed::{CoordsRefIndex, CoordsRelRefIndex, WaysRefIndex};

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::CacheConfig;
use crate::error::Result;

const SUBDIRS: [&str; 3] = ["coords_index", "coords_rel_index", "ways_index"];

/// `<dir>/{coords_index,coords_rel_index,ways_index}`.
#[derive(Debug)]
pub struct DiffCache {
    dir: PathBuf,
    config: CacheConfig,
    pub coords: Option<CoordsRefIndex>,
    pub coords_rel: Option<CoordsRelRefIndex>,
    pub ways: Option<WaysRefIndex>,
}

impl DiffCache {
    pub fn new(dir: impl Into<PathBuf>, config: CacheConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
            coords: None,
            coords_rel: None,
            ways: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_open(&self) -> bool {
        self.coords.is_some()
    }

    /// Open all three indexes, or none: a failure closes the ones already
    /// opened.
    pub fn open(&mut self) -> Result<()> {
        if let Err(e) = self.try_open() {
            if let Err(close_err) = self.close() {
                warn!("closing partially opened diff cache: {close_err}");
            }
            return Err(e);
        }
        info!("opened diff cache in {}", self.dir.display());
        Ok(())
    }

    fn try_open(&mut self) -> Result<()> {
        let cfg = &self.config;
        self.coords = Some(CoordsRefIndex::open(
            &self.dir.join("coords_index"),
            &cfg.coords_index,
        )?);
        self.coords_rel = Some(CoordsRelRefIndex::open(
            &self.dir.join("coords_rel_index"),
            &cfg.coords_rel_index,
        )?);
        self.ways = Some(WaysRefIndex::open(
            &self.dir.join("ways_index"),
            &cfg.ways_index,
        )?);
        Ok(())
    }

    /// Drain and close all indexes. Closing twice is a no-op. All indexes
    /// are closed even if one fails; the first error is returned.
    pub fn close(&mut self) -> Result<()> {
        let results = [
            self.coords.take().map(CoordsRefIndex::close),
            self.coords_rel.take().map(CoordsRelRefIndex::close),
            self.ways.take().map(WaysRefIndex::close),
        ];
        results.into_iter().flatten().collect()
    }

    /// Commit everything buffered so far. Indexes in linear-import mode stay
    /// in it. Every index is flushed even if one fails; the first error is
    /// returned.
    pub fn flush(&self) -> Result<()> {
        self.for_each_index(BunchRefIndex::flush)
    }

    /// Switch all indexes. A failing index does not stop the others from
    /// switching; the first error is returned.
    pub fn set_linear_import(&self, on: bool) -> Result<()> {
        self.for_each_index(|index| index.set_linear_import(on))
    }

    fn for_each_index(&self, f: impl Fn(&BunchRefIndex) -> Result<()>) -> Result<()> {
        let results: Vec<Result<()>> = self.indexes().map(f).collect();
        results.into_iter().collect()
    }

    fn indexes(&self) -> impl Iterator<Item = &BunchRefIndex> {
        let coords = self.coords.as_deref();
        let coords_rel = self.coords_rel.as_deref();
        let ways = self.ways.as_deref();
        coords.into_iter().chain(coords_rel).chain(ways)
    }

    /// Whether the cache is open or any index directory exists. Does not
    /// require [`open`](Self::open).
    pub fn exists(&self) -> bool {
        self.is_open() || SUBDIRS.iter().any(|d| self.dir.join(d).exists())
    }

    /// Close the cache and delete all index directories.
    pub fn remove(&mut self) -> Result<()> {
        self.close()?;
        for d in SUBDIRS {
            let path = self.dir.join(d);
            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
        }
        info!("removed diff cache in {}", self.dir.display());
        Ok(())
    }
}

impl Drop for DiffCache {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing diff cache: {e}");
        }
    }
}
