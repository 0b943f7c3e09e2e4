use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `level` wins over `RUST_LOG`; with
/// neither, `info` is used. Safe to call more than once.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{}': {}; falling back to info", directives, e);
            EnvFilter::new("info")
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
