use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// Install the global tracing subscriber.
///
/// Level comes from `RUST_LOG`, then `LOG_LEVEL`, then defaults to `info`.
/// Output goes to stderr so stdout carries only bot replies.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| fallback_filter(std::env::var("LOG_LEVEL").ok().as_deref()));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Filter from a plain level name such as `DEBUG` or `warn`.
fn fallback_filter(level: Option<&str>) -> EnvFilter {
    level
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .and_then(|l| EnvFilter::try_new(l.to_lowercase()).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_is_used_when_set() {
        assert_eq!(fallback_filter(Some("DEBUG")).to_string(), "debug");
        assert_eq!(fallback_filter(Some(" warn ")).to_string(), "warn");
    }

    #[test]
    fn missing_or_blank_level_defaults_to_info() {
        assert_eq!(fallback_filter(None).to_string(), "info");
        assert_eq!(fallback_filter(Some("  ")).to_string(), "info");
    }
}
