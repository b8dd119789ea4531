//! Log setup for the dirk binary.
//!
//! Logs go to stderr; stdout is reserved for the run report so `--json`
//! output stays machine-readable.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter level for the CLI's `--verbose` flag.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// `RUST_LOG` when set, otherwise `level` for dirk's own crates and warnings
/// for everything else.
fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_str().to_ascii_lowercase();
        EnvFilter::new(format!(
            "warn,dirk_cli={level},dirk_core={level},dirk_ci={level},dirk_docker={level}"
        ))
    })
}

/// Install the global subscriber. Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter(level));
    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_maps_to_debug() {
        assert_eq!(level_for(true), Level::DEBUG);
        assert_eq!(level_for(false), Level::INFO);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_tracing(false, level_for(true));
        init_tracing(true, level_for(false));
        tracing::info!("still logging");
    }
}
