// 📝 Logging setup for the rfid-ledger binary

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "rfid_ledger=info";
const VERBOSE_LOG_FILTER: &str = "rfid_ledger=debug";

/// Install a stderr subscriber. `RUST_LOG` wins over both defaults.
pub fn init_logging(verbose: bool) -> Result<()> {
    let fallback = if verbose { VERBOSE_LOG_FILTER } else { DEFAULT_LOG_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
