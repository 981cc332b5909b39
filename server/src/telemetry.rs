//! Tracing setup for the `kts` binary

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directives applied when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "kts_server=info,kts_workflow=info";

/// Applied by `-v` when `RUST_LOG` is unset
pub const VERBOSE_FILTER: &str = "kts_server=debug,kts_workflow=debug,tower_http=debug";

/// Initialize tracing to stderr.
///
/// `RUST_LOG` overrides [`DEFAULT_FILTER`]; `-v` raises both crates to
/// debug. Set `LOG_FORMAT=json` for structured JSON output.
pub fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::try_new(VERBOSE_FILTER)?,
        Err(_) => EnvFilter::try_new(DEFAULT_FILTER)?,
    };

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
