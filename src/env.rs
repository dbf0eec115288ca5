//! Environment-variable surface of the runtime
//!
//! `NODUS_PMD` carries post-mortem state across nested runtime invocations:
//! an integer counts down through child processes, any other non-empty
//! value enables post-mortem directly.

use tracing_subscriber::EnvFilter;

pub const ENV_DEBUG: &str = "NODUS_DEBUG";
pub const ENV_PMD: &str = "NODUS_PMD";
pub const ENV_BREAKPOINT: &str = "NODUS_BREAKPOINT";
pub const ENV_TRACING: &str = "NODUS_TRACING";

/// `NODUS_DEBUG=true` switches on verbose logging.
pub fn debug_enabled() -> bool {
    std::env::var(ENV_DEBUG).map(|v| v == "true").unwrap_or(false)
}

/// One post-mortem countdown step: the new variable value (if any) and
/// whether post-mortem mode is enabled for this process.
pub fn step_pmd(value: &str) -> (Option<String>, bool) {
    if value.is_empty() {
        return (None, false);
    }
    match value.parse::<i64>() {
        Ok(n) if n > 0 => {
            let next = n - 1;
            if next == 0 {
                (None, false)
            } else {
                (Some(next.to_string()), false)
            }
        }
        Ok(_) => (None, false),
        Err(_) => (Some(value.to_string()), true),
    }
}

/// Apply the countdown to the real environment; returns whether post-mortem
/// is enabled.
pub fn apply_pmd() -> bool {
    let Ok(value) = std::env::var(ENV_PMD) else {
        return false;
    };
    let (next, enabled) = step_pmd(&value);
    match next {
        Some(next) => std::env::set_var(ENV_PMD, next),
        None => std::env::remove_var(ENV_PMD),
    }
    enabled
}

/// `NODUS_BREAKPOINT`: `0` disables, empty selects the default debugger,
/// anything else names one.
pub fn breakpoint_selector() -> Option<String> {
    match std::env::var(ENV_BREAKPOINT) {
        Err(_) => None,
        Ok(v) if v == "0" => None,
        Ok(v) => Some(v),
    }
}

/// `NODUS_TRACING` names an external tracer; the runtime only plumbs the
/// selector through.
pub fn tracing_selector() -> Option<String> {
    std::env::var(ENV_TRACING).ok().filter(|v| !v.is_empty())
}

/// Install the global tracing subscriber for a CLI entry point.
pub fn init_tracing() {
    let filter = if debug_enabled() {
        EnvFilter::new("nodus=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pmd_counts_down() {
        assert_eq!(step_pmd("3"), (Some("2".to_string()), false));
        assert_eq!(step_pmd("1"), (None, false));
        assert_eq!(step_pmd("0"), (None, false));
        assert_eq!(step_pmd("-2"), (None, false));
    }

    #[test]
    fn test_pmd_non_integer_enables_post_mortem() {
        assert_eq!(step_pmd("yes"), (Some("yes".to_string()), true));
        assert_eq!(step_pmd(""), (None, false));
    }
}
