//! Global `tracing` subscriber setup: `-v`/`-q` flags layered over
//! `RUST_LOG` (§4.13, §9 resolved open question — explicit flags win when
//! both are present).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn resolve_level(verbose: u8, quiet: u8) -> &'static str {
    if verbose > 0 {
        return if verbose == 1 { "debug" } else { "trace" };
    }
    if quiet > 0 {
        return if quiet == 1 { "warn" } else { "error" };
    }
    "info"
}

/// Initializes the process-wide subscriber. Call once, before the first
/// request is issued.
pub fn init(verbose: u8, quiet: u8) {
    let filter = if verbose > 0 || quiet > 0 {
        EnvFilter::new(resolve_level(verbose, quiet))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flags_escalate_level() {
        assert_eq!(resolve_level(0, 0), "info");
        assert_eq!(resolve_level(1, 0), "debug");
        assert_eq!(resolve_level(2, 0), "trace");
    }

    #[test]
    fn quiet_flags_deescalate_level() {
        assert_eq!(resolve_level(0, 1), "warn");
        assert_eq!(resolve_level(0, 2), "error");
    }

    #[test]
    fn verbose_takes_precedence_over_quiet() {
        assert_eq!(resolve_level(1, 1), "debug");
    }
}
