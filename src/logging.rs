use tracing_subscriber::EnvFilter;

/// Filter directive in effect: `RUST_LOG`, then the config value, then `info`.
pub fn filter_directive(env: Option<&str>, configured: &str) -> String {
    [env, Some(configured)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty() && EnvFilter::try_new(d).is_ok())
        .unwrap_or("info")
        .to_string()
}

/// Install the global fmt subscriber, writing to stderr so composed text on
/// stdout stays clean. A second call is a no-op.
pub fn init_logging(configured: &str) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(env.as_deref(), configured);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
