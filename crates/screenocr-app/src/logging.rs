use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Structured logs on stderr.
///
/// `RUST_LOG` picks the filter. `SCREENOCR_LOG_JSON=1` switches to one JSON
/// object per line, which is what the detached daemon's log file wants.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("SCREENOCR_LOG_JSON").is_ok_and(|v| v == "1");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder
            .with_ansi(atty::is(atty::Stream::Stderr))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}
