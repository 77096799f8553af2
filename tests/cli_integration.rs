use std::path::Path;
use std::process::{Command, Output};

use osmcache::cache::OsmCache;
use osmcache::config::CacheConfig;
use osmcache::diff::DiffCache;
use osmcache::element::{Member, MemberType, Node, Relation, Way};
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_osmcache").to_string()
}

fn run(args: &[&str], cachedir: Option<&Path>) -> Output {
    let mut cmd = Command::new(bin());
    cmd.env_remove("OSMCACHE_CONFIG").args(args);
    if let Some(dir) = cachedir {
        cmd.arg("--cachedir").arg(dir);
    }
    cmd.output().unwrap()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn build_osm_cache(dir: &Path) {
    let mut cache = OsmCache::new(dir, CacheConfig::default());
    cache.open().unwrap();
    let coords = cache.coords.as_ref().unwrap();
    coords
        .put_coords(&[Node::new(1, 8.0, 53.0), Node::new(2, 8.1, 53.1), Node::new(3, 8.2, 53.2)])
        .unwrap();

    let mut cafe = Node::new(3, 8.2, 53.2);
    cafe.tags.insert("amenity".into(), "cafe".into());
    cache.nodes.as_ref().unwrap().put(&cafe).unwrap();

    let mut way = Way::new(10, vec![1, 2, 3]);
    way.tags.insert("highway".into(), "residential".into());
    cache.ways.as_ref().unwrap().put(&way).unwrap();

    let mut rel = Relation {
        id: 20,
        members: vec![Member::new(10, MemberType::Way, "outer")],
        ..Default::default()
    };
    rel.tags.insert("type".into(), "multipolygon".into());
    cache.relations.as_ref().unwrap().put(&rel).unwrap();
    cache.close().unwrap();
}

#[test]
fn cli_config_prints_json() {
    let out = run(&["config"], None);
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["ways_index"]["bunch_cache_capacity"], 65536);
    assert!(json["coords"]["cache_size_mb"].is_u64());
}

#[test]
fn cli_config_file_overrides_defaults() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cache.json");
    std::fs::write(&cfg, r#"{"nodes": {"cache_size_mb": 7}}"#).unwrap();
    let out = run(&["--cache-config", cfg.to_str().unwrap(), "config"], None);
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["nodes"]["cache_size_mb"], 7);
}

#[test]
fn cli_query_elements() {
    let dir = tempdir().unwrap();
    build_osm_cache(dir.path());

    let out = run(&["query", "--node", "3", "--node", "2", "--node", "99"], Some(dir.path()));
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("node 3: 8.2000000 53.2000000 {amenity=cafe}"), "{text}");
    assert!(text.contains("node 2: 8.1000000 53.1000000"), "{text}");
    assert!(text.contains("node 99 not found"), "{text}");

    let out = run(&["query", "--rel", "20", "--full"], Some(dir.path()));
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("relation 20: {type=multipolygon}"), "{text}");
    assert!(text.contains("way 10 (outer)"), "{text}");
    assert!(text.contains("way 10: refs [1, 2, 3] {highway=residential}"), "{text}");
    assert!(text.contains("  node 1: 8.0000000 53.0000000"), "{text}");
}

#[test]
fn cli_stats() {
    let dir = tempdir().unwrap();
    build_osm_cache(dir.path());
    let out = run(&["stats"], Some(dir.path()));
    assert!(out.status.success());
    assert_eq!(
        stdout(&out),
        "coords: 3\nnodes: 1\nways: 1\nrelations: 1\n"
    );
}

#[test]
fn cli_refs() {
    let dir = tempdir().unwrap();
    {
        let mut diff = DiffCache::new(dir.path(), CacheConfig::default());
        diff.open().unwrap();
        let coords = diff.coords.as_ref().unwrap();
        coords.add_from_way(&Way::new(10, vec![1, 2])).unwrap();
        coords.add_from_way(&Way::new(11, vec![2])).unwrap();
        diff.ways
            .as_ref()
            .unwrap()
            .add_from_members(20, &[Member::new(10, MemberType::Way, "")])
            .unwrap();
        diff.close().unwrap();
    }
    let out = run(&["refs", "--node", "2", "--way", "10"], Some(dir.path()));
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("node 2: ways [10, 11]"), "{text}");
    assert!(text.contains("node 2: relations []"), "{text}");
    assert!(text.contains("way 10: relations [20]"), "{text}");
}

#[test]
fn cli_missing_cache_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nothing-here");
    let out = run(&["stats"], Some(&missing));
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("no osm cache"));
    assert!(!missing.exists());
}

#[test]
fn cli_requires_subcommand() {
    let out = run(&[], None);
    assert!(!out.status.success());
}
