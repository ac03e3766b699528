use std::sync::OnceLock;

use tracing_subscriber::prelude::*;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::{EnvFilter, Registry};

use crate::commands::Verbosity;

static LOGGER_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

/// Log filter for a verbosity level.
fn log_filter(verbosity: Verbosity) -> &'static str {
    match verbosity {
        // Show only errors
        Verbosity::Quiet => "off,nessie=error,nessie_client=error",
        // Only show warnings
        Verbosity::Verbose(0) => "off,nessie=warn,nessie_client=warn",
        // Show our own info logs
        Verbosity::Verbose(1) => "off,nessie=info,nessie_client=info",
        // Also show requests sent by the client
        Verbosity::Verbose(2) => "off,nessie=debug,nessie_client=debug",
        Verbosity::Verbose(3) => "off,nessie=trace,nessie_client=trace",
        // Also show the HTTP stack
        Verbosity::Verbose(4) => "debug,nessie=trace,nessie_client=trace",
        Verbosity::Verbose(_) => "trace",
    }
}

/// Install the logger, or update its filter if it is already installed.
///
/// `RUST_LOG` takes precedence over the verbosity.
pub(crate) fn init_logger(verbosity: Option<Verbosity>) {
    let log_filter = log_filter(verbosity.unwrap_or_default());

    let filter_handle = LOGGER_HANDLE.get_or_init(|| {
        // Start permissive, the actual filter is set right below
        let filter = EnvFilter::new("trace");
        let (filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);
        let log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter);
        tracing_subscriber::registry().with(log_layer).init();
        reload_handle
    });

    update_filters(filter_handle, log_filter);
}

fn update_filters(filter_handle: &Handle<EnvFilter, Registry>, log_filter: &str) {
    let result = filter_handle.modify(|layer| {
        match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_filter)) {
            Ok(new_filter) => *layer = new_filter,
            Err(err) => eprintln!("Updating logger filter failed: {err}"),
        };
    });
    if let Err(err) = result {
        eprintln!("Updating logger filter failed: {err}");
    }
}
