pub mod build_info;

use std::{env, path::PathBuf, sync::Once};

use dirs::home_dir;

const DEFAULT_DIR_NAME: &str = ".household_ledger";
const DEFAULT_DIRECTIVE: &str = "household_ledger=info";

/// Overrides the data directory when set.
pub const HOME_ENV: &str = "HOUSEHOLD_LEDGER_HOME";

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber. `directive` replaces the
/// default `household_ledger=info`; `RUST_LOG` is honoured either way.
pub fn init_tracing(directive: Option<&str>) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(directive.unwrap_or(DEFAULT_DIRECTIVE))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
        });

        // A host application may already own the global subscriber.
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    });
}

/// Returns the application data directory, defaulting to `~/.household_ledger`.
pub fn app_data_dir() -> PathBuf {
    if let Some(custom) = env::var_os(HOME_ENV) {
        return PathBuf::from(custom);
    }
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}
