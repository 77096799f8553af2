// All element caches of one import, under a common directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::{DeltaCoordsCache, NodesCache, RelationsCache, WaysCache};
use crate::config::CacheConfig;
use crate::error::Result;

const SUBDIRS: [&str; 4] = ["coords", "nodes", "ways", "relations"];

/// `<dir>/{coords,nodes,ways,relations}`.
///
/// Fields are `None` until [`open`](Self::open) and after
/// [`close`](Self::close).
#[derive(Debug)]
pub struct OsmCache {
    dir: PathBuf,
    config: CacheConfig,
    pub coords: Option<DeltaCoordsCache>,
    pub nodes: Option<NodesCache>,
    pub ways: Option<WaysCache>,
    pub relations: Option<RelationsCache>,
}

impl OsmCache {
    pub fn new(dir: impl Into<PathBuf>, config: CacheConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
            coords: None,
            nodes: None,
            ways: None,
            relations: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_open(&self) -> bool {
        self.coords.is_some()
    }

    /// Open all four caches. On failure the ones already opened are closed
    /// again and the error is returned.
    pub fn open(&mut self) -> Result<()> {
        if let Err(e) = self.try_open() {
            self.close_quietly();
            return Err(e);
        }
        info!("opened osm cache in {}", self.dir.display());
        Ok(())
    }

    fn try_open(&mut self) -> Result<()> {
        let cfg = &self.config;
        self.coords = Some(DeltaCoordsCache::open(&self.dir.join("coords"), &cfg.coords)?);
        self.nodes = Some(NodesCache::open(&self.dir.join("nodes"), &cfg.nodes)?);
        self.ways = Some(WaysCache::open(&self.dir.join("ways"), &cfg.ways)?);
        self.relations = Some(RelationsCache::open(
            &self.dir.join("relations"),
            &cfg.relations,
        )?);
        Ok(())
    }

    /// Flush and close all caches. Closing a closed cache does nothing.
    /// Every cache is closed even if an earlier one fails; the first error
    /// is returned.
    pub fn close(&mut self) -> Result<()> {
        let mut first = Ok(());
        let mut keep = |r: Result<()>| {
            if first.is_ok() {
                first = r;
            }
        };
        if let Some(c) = self.coords.take() {
            keep(c.close());
        }
        if let Some(c) = self.nodes.take() {
            keep(c.close());
        }
        if let Some(c) = self.ways.take() {
            keep(c.close());
        }
        if let Some(c) = self.relations.take() {
            keep(c.close());
        }
        first
    }

    fn close_quietly(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("closing partially opened osm cache: {e}");
        }
    }

    /// Whether the cache is open or any cache directory exists.
    pub fn exists(&self) -> bool {
        self.is_open() || SUBDIRS.iter().any(|d| self.dir.join(d).exists())
    }

    /// Close the cache and delete all cache directories.
    pub fn remove(&mut self) -> Result<()> {
        self.close()?;
        for d in SUBDIRS {
            let path = self.dir.join(d);
            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
        }
        info!("removed osm cache in {}", self.dir.display());
        Ok(())
    }
}

impl Drop for OsmCache {
    fn drop(&mut self) {
        self.close_quietly();
    }
}
