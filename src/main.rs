use std::process::ExitCode;

use focusguard::cli::{exit_code, run_cli};
use tracing::error;


#[tokio::main]
async fn main() -> ExitCode {
    match run_cli().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error running cli {e:?}");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
