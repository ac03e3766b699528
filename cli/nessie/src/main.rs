use std::process::ExitCode;

use anyhow::Result;
use bpaf::Args;
use commands::{NessieArgs, NessieCli};
use itertools::Itertools;
use nessie_client::CatalogClientError;
use tracing::debug;
use utils::logger::init_logger;
use utils::message;

mod commands;
mod config;
mod utils;

async fn run(args: NessieArgs) -> Result<()> {
    init_logger(Some(args.verbosity));
    args.handle().await
}

fn main() -> ExitCode {
    // initialize logger with "best guess" defaults
    init_logger(None);

    // Run the argument parser
    //
    // Pass through Completion "failure"; In completion mode this needs to be printed as is
    // to work with the shell completion frontends
    //
    // Pass through Stdout failure; This represents `--help` and `--version`
    let args = match commands::nessie_cli().run_inner(Args::current_args()) {
        Ok(NessieCli(args)) => args,
        Err(bpaf::ParseFailure::Stdout(m, _)) => {
            print!("{m:80}");
            return ExitCode::from(0);
        },
        Err(bpaf::ParseFailure::Stderr(m)) => {
            message::error(format!("{m:80}"));
            return ExitCode::from(1);
        },
        Err(bpaf::ParseFailure::Completion(c)) => {
            print!("{c}");
            return ExitCode::from(0);
        },
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            message::error(format!("Could not start the async runtime: {e}"));
            return ExitCode::from(1);
        },
    };

    // Print errors and exit with status 1 on failure
    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            debug!("{:#}", e);

            message::error(e.chain().join(": "));

            let client_error = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<CatalogClientError>());
            if client_error.is_some_and(CatalogClientError::is_concurrent_modification) {
                message::warning(
                    "The branch moved since its hash was read. \
                     Get the current hash with 'nessie refs hash <BRANCH>' and try again.",
                );
            }

            ExitCode::from(1)
        },
    }
}
