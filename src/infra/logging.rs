//! Filepath: src/infra/logging.rs
//! Tracing subscriber setup for the binary. Logs go to stderr so that
//! stdout stays clean for JSON and patch output.

use tracing_subscriber::{EnvFilter, fmt};

/// Default level for the global flags; `RUST_LOG` wins when set
pub fn default_level(verbose: bool, quiet: bool) -> &'static str {
    match (verbose, quiet) {
        (true, _) => "debug",
        (false, true) => "error",
        (false, false) => "warn",
    }
}

/// Install the global subscriber; a second call is a no-op
pub fn init(verbose: bool, quiet: bool, color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(verbose, quiet)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(color)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_beats_quiet() {
        assert_eq!(default_level(true, true), "debug");
        assert_eq!(default_level(false, true), "error");
        assert_eq!(default_level(false, false), "warn");
    }
}
