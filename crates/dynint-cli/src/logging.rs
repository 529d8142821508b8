use tracing_subscriber::EnvFilter;

/// Installs the global subscriber, writing to stderr so `--json` output on
/// stdout stays machine-readable.
///
/// An explicit `directive` wins over `RUST_LOG`; without either, `info`.
pub fn init(directive: Option<&str>) -> anyhow::Result<()> {
    let filter = match directive {
        Some(d) => EnvFilter::try_new(d)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
