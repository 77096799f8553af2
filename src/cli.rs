// Command line inspection tool for OSM and diff caches.
//
// Read-only apart from the engine's own bookkeeping: every command opens
// the caches, prints, and closes them again.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use log::LevelFilter;

use crate::cache::OsmCache;
use crate::config::CacheConfig;
use crate::diff::DiffCache;
use crate::element::{MemberType, Node, Relation, Tags, Way};
use crate::error::{CacheError, Result};

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Inspect osmcache element and reference caches.
#[derive(Parser, Debug)]
#[command(
    name = "osmcache",
    version,
    about = "Inspect OSM element caches and diff reference indexes",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// JSON file overriding the default cache profile.
    #[arg(long = "cache-config", global = true, value_hint = ValueHint::FilePath)]
    cache_config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the effective cache configuration as JSON.
    Config,
    /// Print cached elements.
    Query(QueryArgs),
    /// Print the ways and relations referencing an element.
    Refs(RefsArgs),
    /// Count cached records.
    Stats(CacheDirArg),
}

#[derive(Args, Debug)]
struct CacheDirArg {
    /// Cache directory.
    #[arg(long, value_hint = ValueHint::DirPath)]
    cachedir: PathBuf,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[command(flatten)]
    dir: CacheDirArg,

    /// Node IDs.
    #[arg(long = "node", value_name = "ID", allow_hyphen_values = true)]
    nodes: Vec<i64>,

    /// Way IDs.
    #[arg(long = "way", value_name = "ID", allow_hyphen_values = true)]
    ways: Vec<i64>,

    /// Relation IDs.
    #[arg(long = "rel", value_name = "ID", allow_hyphen_values = true)]
    rels: Vec<i64>,

    /// Also print referenced nodes and ways.
    #[arg(long)]
    full: bool,
}

#[derive(Args, Debug)]
struct RefsArgs {
    #[command(flatten)]
    dir: CacheDirArg,

    /// Node IDs.
    #[arg(long = "node", value_name = "ID", allow_hyphen_values = true)]
    nodes: Vec<i64>,

    /// Way IDs.
    #[arg(long = "way", value_name = "ID", allow_hyphen_values = true)]
    ways: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn fmt_tags(tags: &Tags) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!(" {{{}}}", pairs.join(", "))
}

fn fmt_node(n: &Node) -> String {
    format!("node {}: {:.7} {:.7}{}", n.id, n.long, n.lat, fmt_tags(&n.tags))
}

fn fmt_way(w: &Way) -> String {
    format!("way {}: refs {:?}{}", w.id, w.refs, fmt_tags(&w.tags))
}

fn fmt_relation(r: &Relation) -> String {
    let mut out = format!("relation {}:{}", r.id, fmt_tags(&r.tags));
    for m in &r.members {
        let _ = write!(out, "\n  {} {} ({})", m.kind.as_str(), m.id, m.role);
    }
    out
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_config(config: &CacheConfig) -> i32 {
    match serde_json::to_string_pretty(config) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("osmcache: {e}");
            1
        }
    }
}

fn open_osm_cache(dir: &Path, config: &CacheConfig) -> Result<OsmCache> {
    let mut cache = OsmCache::new(dir, config.clone());
    if !cache.exists() {
        return Err(missing_cache("osm", dir));
    }
    cache.open()?;
    Ok(cache)
}

fn open_diff_cache(dir: &Path, config: &CacheConfig) -> Result<DiffCache> {
    let mut cache = DiffCache::new(dir, config.clone());
    if !cache.exists() {
        return Err(missing_cache("diff", dir));
    }
    cache.open()?;
    Ok(cache)
}

fn missing_cache(kind: &str, dir: &Path) -> CacheError {
    CacheError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no {kind} cache in {}", dir.display()),
    ))
}

/// Print `r`, or a "not found" line for `NotFound`.
fn print_or_missing(what: &str, id: i64, r: Result<String>) -> Result<()> {
    match r {
        Ok(s) => println!("{s}"),
        Err(CacheError::NotFound) => println!("{what} {id} not found"),
        Err(e) => return Err(e),
    }
    Ok(())
}

fn lookup_node(cache: &OsmCache, id: i64) -> Result<Node> {
    if let Some(nodes) = &cache.nodes {
        match nodes.get(id) {
            Err(CacheError::NotFound) => {}
            other => return other,
        }
    }
    match &cache.coords {
        Some(coords) => coords.get_coord(id),
        None => Err(CacheError::NotFound),
    }
}

fn describe_way(cache: &OsmCache, id: i64, full: bool) -> Result<String> {
    let ways = cache.ways.as_ref().ok_or(CacheError::NotFound)?;
    let way = ways.get(id)?;
    let mut out = fmt_way(&way);
    if full {
        for &r in &way.refs {
            match lookup_node(cache, r) {
                Ok(n) => {
                    let _ = write!(out, "\n  {}", fmt_node(&n));
                }
                Err(CacheError::NotFound) => {
                    let _ = write!(out, "\n  node {r} not found");
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(out)
}

fn describe_relation(cache: &OsmCache, id: i64, full: bool) -> Result<String> {
    let rels = cache.relations.as_ref().ok_or(CacheError::NotFound)?;
    let rel = rels.get(id)?;
    let mut out = fmt_relation(&rel);
    if full {
        for m in rel.members.iter().filter(|m| m.kind == MemberType::Way) {
            match describe_way(cache, m.id, true) {
                Ok(s) => {
                    let _ = write!(out, "\n{s}");
                }
                Err(CacheError::NotFound) => {
                    let _ = write!(out, "\nway {} not found", m.id);
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(out)
}

fn cmd_query(args: &QueryArgs, config: &CacheConfig) -> Result<()> {
    let mut cache = open_osm_cache(&args.dir.cachedir, config)?;
    for &id in &args.nodes {
        print_or_missing("node", id, lookup_node(&cache, id).map(|n| fmt_node(&n)))?;
    }
    for &id in &args.ways {
        print_or_missing("way", id, describe_way(&cache, id, args.full))?;
    }
    for &id in &args.rels {
        print_or_missing("relation", id, describe_relation(&cache, id, args.full))?;
    }
    cache.close()
}

fn cmd_refs(args: &RefsArgs, config: &CacheConfig) -> Result<()> {
    let mut cache = open_diff_cache(&args.dir.cachedir, config)?;
    for &id in &args.nodes {
        if let Some(index) = &cache.coords {
            println!("node {id}: ways {:?}", index.get(id)?);
        }
        if let Some(index) = &cache.coords_rel {
            println!("node {id}: relations {:?}", index.get(id)?);
        }
    }
    for &id in &args.ways {
        if let Some(index) = &cache.ways {
            println!("way {id}: relations {:?}", index.get(id)?);
        }
    }
    cache.close()
}

fn cmd_stats(args: &CacheDirArg, config: &CacheConfig) -> Result<()> {
    let mut cache = open_osm_cache(&args.cachedir, config)?;
    if let Some(coords) = &cache.coords {
        println!("coords: {}", count(coords.iter()?)?);
    }
    if let Some(nodes) = &cache.nodes {
        println!("nodes: {}", count(nodes.iter())?);
    }
    if let Some(ways) = &cache.ways {
        println!("ways: {}", count(ways.iter())?);
    }
    if let Some(rels) = &cache.relations {
        println!("relations: {}", count(rels.iter())?);
    }
    cache.close()
}

fn count<T>(mut iter: impl Iterator<Item = Result<T>>) -> Result<usize> {
    iter.try_fold(0, |n, item| item.map(|_| n + 1))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn log_level(verbose: u8) -> Option<LevelFilter> {
    match verbose {
        0 => None,
        1 => Some(LevelFilter::Info),
        2 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    logger.format_timestamp(None).format_target(false);
    if let Some(level) = log_level(cli.verbose) {
        logger.filter_level(level);
    }
    logger.init();

    let config = match &cli.cache_config {
        Some(path) => CacheConfig::load(path),
        None => CacheConfig::from_env(),
    };

    let result = match &cli.command {
        Cmd::Config => process::exit(cmd_config(&config)),
        Cmd::Query(args) => cmd_query(args, &config),
        Cmd::Refs(args) => cmd_refs(args, &config),
        Cmd::Stats(args) => cmd_stats(args, &config),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("osmcache: {e}");
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let argv: Vec<String> = std::iter::once("osmcache".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        Cli::try_parse_from(argv).expect("cli parse failed")
    }

    #[test]
    fn query_collects_ids() {
        let cli = parse(&[
            "query", "--cachedir", "/tmp/c", "--node", "1", "--node", "-5", "--way", "7", "--full",
        ]);
        let Cmd::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.dir.cachedir, PathBuf::from("/tmp/c"));
        assert_eq!(args.nodes, vec![1, -5]);
        assert_eq!(args.ways, vec![7]);
        assert!(args.rels.is_empty());
        assert!(args.full);
    }

    #[test]
    fn global_flags() {
        let cli = parse(&["-vv", "--cache-config", "cfg.json", "config"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.cache_config, Some(PathBuf::from("cfg.json")));
        assert!(matches!(cli.command, Cmd::Config));
        assert_eq!(log_level(cli.verbose), Some(LevelFilter::Debug));
        assert_eq!(log_level(0), None);
    }

    #[test]
    fn cachedir_is_required() {
        assert!(Cli::try_parse_from(["osmcache", "stats"]).is_err());
    }

    #[test]
    fn formatting() {
        let mut n = Node::new(3, 1.0, -2.5);
        n.tags.insert("name".into(), "x".into());
        assert_eq!(fmt_node(&n), "node 3: 1.0000000 -2.5000000 {name=x}");
        assert_eq!(fmt_way(&Way::new(4, vec![1, 2])), "way 4: refs [1, 2]");
    }

    #[test]
    fn missing_cache_is_io_not_found() {
        let dir = PathBuf::from("/nonexistent/osmcache-dir");
        let err = open_osm_cache(&dir, &CacheConfig::default()).unwrap_err();
        assert!(matches!(&err, CacheError::Io(e) if e.kind() == io::ErrorKind::NotFound));
        assert!(err.to_string().contains("no osm cache in /nonexistent/osmcache-dir"));
        let err = open_diff_cache(&dir, &CacheConfig::default()).unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
    }

    #[test]
    fn count_stops_at_first_error() {
        let items: Vec<Result<u8>> = vec![Ok(1), Ok(2)];
        assert_eq!(count(items.into_iter()).unwrap(), 2);
        let items: Vec<Result<u8>> = vec![Ok(1), Err(CacheError::NotFound), Ok(3)];
        assert!(count(items.into_iter()).unwrap_err().is_not_found());
    }
}
