#![doc(test(attr(deny(warnings))))]

//! Household Ledger tracks shared expenses between two household members:
//! review of new expenses, recurring and installment charges, monthly
//! settlement, and repayments.

pub mod config;
pub mod core;
pub mod domain;
pub mod errors;
pub mod storage;
pub mod utils;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    init_with_filter(None);
}

/// Like [`init`], with an explicit filter directive taking the place of the
/// default one. `RUST_LOG` still wins when set.
pub fn init_with_filter(filter: Option<&str>) {
    INIT_TRACING.call_once(|| {
        utils::init_tracing(filter);
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            "Household Ledger tracing initialized."
        );
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
        super::init_with_filter(Some("household_ledger=debug"));
    }
}
