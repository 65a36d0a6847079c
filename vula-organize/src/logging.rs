/// Initializes `pretty_env_logger` as the global logger, reading level
/// filters from `RUST_LOG` the way the teacher's binaries do. A thin
/// convenience for anyone embedding this crate in a CLI; the library itself
/// never calls this and never forces a logger on callers (§4.J "Logging").
pub fn init_logging() {
    pretty_env_logger::try_init().ok();
}
