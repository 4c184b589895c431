#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

mod daemon;
mod invoice;
mod wallet;

pub use daemon::MockDaemon;
pub use invoice::{invoice_with_prompt, MockPayment};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};
pub use wallet::{MockTransfer, MockWallet};

pub const CRYPTO_CODE: &str = "ZANO";

/// Initialize the logging implementation.
pub fn init_logger() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env_lossy();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_test_writer()
        .with_filter(filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}
