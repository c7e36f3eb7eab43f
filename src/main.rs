use colored::*;
use matrix_ci::cli;
use matrix_ci::core::error::ConfigurationError;
use std::process::ExitCode;

/// Exit code for a configuration that cannot be expanded or parsed.
const CONFIGURATION_ERROR_EXIT: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let is_configuration_error = e
                .chain()
                .any(|cause| cause.downcast_ref::<ConfigurationError>().is_some());
            if is_configuration_error {
                ExitCode::from(CONFIGURATION_ERROR_EXIT)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
