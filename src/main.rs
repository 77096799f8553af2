fn main() {
    #[cfg(feature = "cli")]
    osmcache::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("osmcache: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
