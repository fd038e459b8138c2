use cdp_batch::cli::{run, Cli};
use cdp_batch::logging::init_logging;
use cdp_batch_core::artifacts::RunTimestamp;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let timestamp = RunTimestamp::now();

    // Held until main returns so the log file is flushed on every path.
    let _log_guard = match init_logging(&cli.log_dir, &timestamp) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("[ERROR] Failed to initialise logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let result = run(cli, timestamp).await;
    match &result {
        Ok(_) => {
            tracing::info!("CLI completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            ExitCode::FAILURE
        }
    }
}
