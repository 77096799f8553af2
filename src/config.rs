// Cache tuning profiles.
//
// Every on-disk store gets its own `StoreOptions`. The compiled-in default
// profile can be overridden per field by a JSON file; fields missing from
// the file keep their defaults.

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Environment variable naming an override file for [`CacheConfig::from_env`].
pub const CONFIG_ENV: &str = "OSMCACHE_CONFIG";

/// Engine options for one store. `0` leaves the engine default in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// LRU block cache size in MiB.
    pub cache_size_mb: usize,
    /// Memtable size in MiB.
    pub write_buffer_size_mb: usize,
    pub block_size_kb: usize,
    pub max_open_files: i32,
    pub block_restart_interval: i32,
}

impl StoreOptions {
    pub const fn new(
        cache_size_mb: usize,
        write_buffer_size_mb: usize,
        max_open_files: i32,
        block_restart_interval: i32,
    ) -> Self {
        Self {
            cache_size_mb,
            write_buffer_size_mb,
            block_size_kb: 0,
            max_open_files,
            block_restart_interval,
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new(16, 64, 64, 128)
    }
}

/// Options for bunched stores.
///
/// For the coordinate cache `bunch_size` is the number of coordinates per
/// record and `bunch_cache_capacity` the number of bunches kept in memory.
/// For reference indexes `bunch_size` pre-sizes the linear-import buffer (in
/// bunches) and `bunch_cache_capacity` is the number of buffered entries
/// that triggers a hand-off to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BunchOptions {
    #[serde(flatten)]
    pub store: StoreOptions,
    pub bunch_size: usize,
    pub bunch_cache_capacity: usize,
}

impl Default for BunchOptions {
    fn default() -> Self {
        Self {
            store: StoreOptions::new(16, 64, 64, 256),
            bunch_size: 32,
            bunch_cache_capacity: 8096,
        }
    }
}

impl BunchOptions {
    fn index(store: StoreOptions) -> Self {
        Self {
            store,
            bunch_size: 1024,
            bunch_cache_capacity: 64 * 1024,
        }
    }
}

/// Options for every store of an OSM cache and its diff cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub coords: BunchOptions,
    pub nodes: StoreOptions,
    pub ways: StoreOptions,
    pub relations: StoreOptions,
    pub coords_index: BunchOptions,
    pub coords_rel_index: BunchOptions,
    pub ways_index: BunchOptions,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            coords: BunchOptions::default(),
            nodes: StoreOptions::default(),
            ways: StoreOptions::default(),
            relations: StoreOptions::default(),
            coords_index: BunchOptions::index(StoreOptions::new(32, 128, 256, 256)),
            coords_rel_index: BunchOptions::index(StoreOptions::new(32, 128, 256, 256)),
            ways_index: BunchOptions::index(StoreOptions::default()),
        }
    }
}

impl CacheConfig {
    /// Overlay the JSON document at `path` onto the default profile.
    pub fn try_from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("{}: {e}", path.display())))?;
        Self::try_from_json(&data)
    }

    /// Overlay a JSON document onto the default profile.
    pub fn try_from_json(data: &str) -> Result<Self> {
        let overlay: Value =
            serde_json::from_str(data).map_err(|e| CacheError::Config(e.to_string()))?;
        if !overlay.is_object() {
            return Err(CacheError::Config("top level must be an object".into()));
        }
        let mut base =
            serde_json::to_value(Self::default()).map_err(|e| CacheError::Config(e.to_string()))?;
        merge(&mut base, overlay);
        serde_json::from_value(base).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Like [`try_from_file`](Self::try_from_file), but falls back to the
    /// default profile with a warning.
    pub fn load(path: &Path) -> Self {
        match Self::try_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("using default cache config: {e}");
                Self::default()
            }
        }
    }

    /// Read the override file named by `OSMCACHE_CONFIG`, if set.
    pub fn from_env() -> Self {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Self::default(),
        }
    }
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (k, v) in overlay {
                match base.get_mut(&k) {
                    Some(slot) => merge(slot, v),
                    None => {
                        base.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.coords.bunch_size, 32);
        assert_eq!(cfg.coords.bunch_cache_capacity, 8096);
        assert_eq!(cfg.coords.store.block_restart_interval, 256);
        assert_eq!(cfg.nodes.block_restart_interval, 128);
        assert_eq!(cfg.coords_index.store.max_open_files, 256);
        assert_eq!(cfg.coords_index.bunch_cache_capacity, 65536);
        assert_eq!(cfg.ways_index.store.cache_size_mb, 16);
    }

    #[test]
    fn partial_override() {
        let cfg = CacheConfig::try_from_json(
            r#"{"coords": {"bunch_size": 64}, "ways": {"cache_size_mb": 1}}"#,
        )
        .unwrap();
        assert_eq!(cfg.coords.bunch_size, 64);
        assert_eq!(cfg.coords.bunch_cache_capacity, 8096);
        assert_eq!(cfg.coords.store.block_restart_interval, 256);
        assert_eq!(cfg.ways.cache_size_mb, 1);
        assert_eq!(cfg.ways.write_buffer_size_mb, 64);
        assert_eq!(cfg.nodes, StoreOptions::default());
    }

    #[test]
    fn json_roundtrip() {
        let cfg = CacheConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"cache_size_mb\""));
        assert_eq!(CacheConfig::try_from_json(&json).unwrap(), cfg);
    }

    #[test]
    fn malformed_is_config_error() {
        assert!(matches!(
            CacheConfig::try_from_json("{\"coords\": "),
            Err(CacheError::Config(_))
        ));
        assert!(matches!(
            CacheConfig::try_from_json("[1]"),
            Err(CacheError::Config(_))
        ));
        assert!(matches!(
            CacheConfig::try_from_json(r#"{"nodes": {"cache_size_mb": "big"}}"#),
            Err(CacheError::Config(_))
        ));
    }

    #[test]
    fn load_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(CacheConfig::load(&missing), CacheConfig::default());

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "not json").unwrap();
        assert_eq!(CacheConfig::load(&bad), CacheConfig::default());

        let good = dir.path().join("good.json");
        fs::write(&good, r#"{"relations": {"max_open_files": 7}}"#).unwrap();
        assert_eq!(CacheConfig::load(&good).relations.max_open_files, 7);
    }
}
