//! jsreport binary entry point.

use jsreport_cli::cli::{self, PreScan};
use jsreport_cli::ui::output;
use tracing_subscriber::EnvFilter;

fn main() -> std::process::ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    init_tracing(PreScan::scan(&args).verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            output::error(format!("failed to start async runtime: {}", err));
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::run(args)) {
        Ok(code) => code.into(),
        Err(err) => {
            output::error(format!("{:#}", err));
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
