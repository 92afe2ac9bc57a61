//! Log output for the `tickloop` binary.
//!
//! Logs go to stderr, leaving stdout to the collaborators and to command
//! output such as `show-config`. `RUST_LOG` overrides the level chosen on
//! the command line.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber: `level` unless `RUST_LOG` is set, JSON
/// lines when `json` is true. A second call keeps the first subscriber.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr)
            .try_init()
            .ok();
    }
}
