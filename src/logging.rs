use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Logs go to stderr so stdout stays clean JSON.
///
/// The returned guard flushes the log file on drop; keep it alive for the whole run.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
  // Base level from config, still overridable via RUST_LOG.
  let level = &config.level;
  let default = format!("{level},scoreline={level},rusqlite=warn,reqwest=warn,hyper=warn");
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  let stderr = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(true);

  match &config.directory {
    Some(directory) => {
      let appender = tracing_appender::rolling::daily(directory, "scoreline.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let file = fmt::layer().with_writer(writer).with_ansi(false);

      tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .init();
      None
    }
  }
}
