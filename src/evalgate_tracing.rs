use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Configures tracing for the action.
///
/// Everything goes to stderr so workflow commands on stdout stay parseable
/// by the runner; the job log already timestamps lines.
pub fn init() -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .compact()
        .without_time()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
