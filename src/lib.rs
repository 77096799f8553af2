//! osmcache: on-disk OpenStreetMap element caches and reference indexes.
//!
//! The crate provides:
//! - Compact binary record formats with tag dictionary compression (`binary`)
//! - Typed node/way/relation and coordinate caches (`cache`)
//! - Bunched reverse reference indexes for diff imports (`diff`)
//! - A `KvStore` abstraction with RocksDB and in-memory backends (`store`)
//! - An optional inspection CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use osmcache::cache::OsmCache;
//! use osmcache::config::CacheConfig;
//! use osmcache::element::Way;
//!
//! let mut cache = OsmCache::new("/tmp/osmcache", CacheConfig::from_env());
//! cache.open().unwrap();
//! let ways = cache.ways.as_ref().unwrap();
//! ways.put(&Way::new(1, vec![10, 11, 12])).unwrap();
//! assert_eq!(ways.get(1).unwrap().refs, vec![10, 11, 12]);
//! cache.close().unwrap();
//! ```

pub mod binary;
pub mod cache;
pub mod config;
pub mod diff;
pub mod element;
pub mod error;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{CacheError, Result};
