use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install the global log subscriber. Log lines go to stderr so they never mix with command output
///
/// `RUST_LOG` overrides the configured level. Calling this twice keeps the first subscriber.
pub fn init(config: &LogConfig) {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.level))
    .unwrap_or_else(|_| EnvFilter::new("info"));

  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .try_init();
}
