// Diff cache on RocksDB.

use osmcache::config::CacheConfig;
use osmcache::diff::DiffCache;
use osmcache::element::{Member, MemberType, Way};
use osmcache::store::{KvStore, RocksStore, id_to_key};
use tempfile::tempdir;

fn small_buffers() -> CacheConfig {
    let mut cfg = CacheConfig::default();
    cfg.coords_index.bunch_cache_capacity = 100;
    cfg.coords_rel_index.bunch_cache_capacity = 100;
    cfg.ways_index.bunch_cache_capacity = 100;
    cfg
}

#[test]
fn diff_cache_lifecycle() {
    let dir = tempdir().unwrap();
    let mut cache = DiffCache::new(dir.path(), CacheConfig::default());
    assert!(!cache.exists());
    cache.open().unwrap();
    assert!(cache.exists());
    for sub in ["coords_index", "coords_rel_index", "ways_index"] {
        assert!(dir.path().join(sub).is_dir(), "{sub}");
    }
    cache.close().unwrap();
    cache.close().unwrap();

    let mut other = DiffCache::new(dir.path(), CacheConfig::default());
    assert!(other.exists());
    other.remove().unwrap();
    assert!(!other.exists());
}

#[test]
fn linear_import_then_query() {
    let dir = tempdir().unwrap();
    let mut cache = DiffCache::new(dir.path(), small_buffers());
    cache.open().unwrap();
    cache.set_linear_import(true).unwrap();

    let coords = cache.coords.as_ref().unwrap();
    for w in 0..50 {
        let refs: Vec<i64> = (w * 10..w * 10 + 12).collect();
        coords.add_from_way(&Way::new(1000 + w, refs)).unwrap();
    }
    let members = vec![
        Member::new(5, MemberType::Node, "label"),
        Member::new(1003, MemberType::Way, "outer"),
    ];
    cache.coords_rel.as_ref().unwrap().add_from_members(77, &members).unwrap();
    cache.ways.as_ref().unwrap().add_from_members(77, &members).unwrap();

    cache.flush().unwrap();
    assert!(cache.coords.as_ref().unwrap().is_linear_import());
    cache.set_linear_import(false).unwrap();

    let coords = cache.coords.as_ref().unwrap();
    assert_eq!(coords.get(0).unwrap(), vec![1000]);
    assert_eq!(coords.get(10).unwrap(), vec![1000, 1001]);
    assert_eq!(coords.get(501).unwrap(), vec![1049]);
    assert!(coords.get(600).unwrap().is_empty());
    assert_eq!(cache.coords_rel.as_ref().unwrap().get(5).unwrap(), vec![77]);
    assert_eq!(cache.ways.as_ref().unwrap().get(1003).unwrap(), vec![77]);
    assert!(cache.ways.as_ref().unwrap().get(5).unwrap().is_empty());
    cache.close().unwrap();

    let mut reopened = DiffCache::new(dir.path(), CacheConfig::default());
    reopened.open().unwrap();
    assert_eq!(reopened.coords.as_ref().unwrap().get(11).unwrap(), vec![1000, 1001]);
}

#[test]
fn close_drains_linear_import() {
    let dir = tempdir().unwrap();
    {
        let mut cache = DiffCache::new(dir.path(), small_buffers());
        cache.open().unwrap();
        cache.set_linear_import(true).unwrap();
        for n in 0..300 {
            cache.coords.as_ref().unwrap().add(n, 1).unwrap();
        }
        cache.close().unwrap();
    }
    let mut cache = DiffCache::new(dir.path(), CacheConfig::default());
    cache.open().unwrap();
    let coords = cache.coords.as_ref().unwrap();
    assert!((0..300).all(|n| coords.get(n).unwrap() == vec![1]));
}

#[test]
fn idle_updates_for_diffs() {
    let dir = tempdir().unwrap();
    let mut cache = DiffCache::new(dir.path(), CacheConfig::default());
    cache.open().unwrap();
    let coords = cache.coords.as_ref().unwrap();

    let old = Way::new(100, vec![1000, 1001, 1002]);
    let new = Way::new(100, vec![1001, 1002, 1003]);
    coords.add_from_way(&old).unwrap();
    coords.add_from_way(&Way::new(200, vec![1002])).unwrap();

    // way 100 modified by a diff
    coords.delete_from_way(&old).unwrap();
    coords.add_from_way(&new).unwrap();

    assert!(coords.get(1000).unwrap().is_empty());
    assert_eq!(coords.get(1002).unwrap(), vec![100, 200]);
    assert_eq!(coords.get(1003).unwrap(), vec![100]);

    coords.delete(1002).unwrap();
    coords.delete(1002).unwrap();
    assert!(coords.get(1002).unwrap().is_empty());
}

#[test]
fn failing_index_does_not_strand_the_others() {
    let dir = tempdir().unwrap();
    let cfg = CacheConfig::default();
    {
        let path = dir.path().join("coords_index");
        let store = RocksStore::open(&path, &cfg.coords_index.store).unwrap();
        store.put(&id_to_key(0), &[0xff]).unwrap();
    }
    let mut cache = DiffCache::new(dir.path(), cfg);
    cache.open().unwrap();

    cache.set_linear_import(true).unwrap();
    cache.coords.as_ref().unwrap().add(5, 1).unwrap();
    cache.ways.as_ref().unwrap().add(5, 1).unwrap();
    assert!(cache.set_linear_import(false).unwrap_err().to_string().contains("corrupt"));
    assert!(!cache.coords.as_ref().unwrap().is_linear_import());
    assert!(!cache.ways.as_ref().unwrap().is_linear_import());
    assert_eq!(cache.ways.as_ref().unwrap().get(5).unwrap(), vec![1]);

    cache.set_linear_import(true).unwrap();
    cache.coords.as_ref().unwrap().add(7, 1).unwrap();
    cache.ways.as_ref().unwrap().add(6, 2).unwrap();
    assert!(cache.flush().is_err());
    cache.set_linear_import(false).unwrap();
    assert_eq!(cache.ways.as_ref().unwrap().get(6).unwrap(), vec![2]);
}
