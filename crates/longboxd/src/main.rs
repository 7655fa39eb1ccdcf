use std::process::ExitCode;

use clap::Parser;

use longboxd::cli::Cli;
use longboxd::{
    EXIT_CODE_RESTART, EXIT_CODE_RESTART_WITH_UPDATE, LaunchError, SupervisorOutcome,
    run_supervisor,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_supervisor(&cli) {
        Ok(SupervisorOutcome::Shutdown) => ExitCode::SUCCESS,
        Ok(SupervisorOutcome::Restart { update: false }) => ExitCode::from(EXIT_CODE_RESTART),
        Ok(SupervisorOutcome::Restart { update: true }) => {
            ExitCode::from(EXIT_CODE_RESTART_WITH_UPDATE)
        }
        Err(error) => {
            eprintln!("longboxd: {error}");
            match error {
                LaunchError::Usage(_) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
