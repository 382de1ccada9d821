//! Diagnostic logging. The report itself goes to stdout through
//! [`crate::output::Output`]; tracing events go to stderr.
//!
//! `RUST_LOG=metascrub=debug` shows parser selection and every structure
//! visited by the walkers.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("metascrub=warn"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .compact(),
    );

    // already installed when embedded in a host that set its own subscriber
    let _ = tracing::subscriber::set_global_default(subscriber);
}
