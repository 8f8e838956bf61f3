//! CLI entry point for the loam analytics core.
//!
//! Parses command-line arguments with clap, executes the command against
//! the process-wide state, renders the JSON payload to stdout, and maps
//! errors to exit codes. Logging is initialised eagerly so subsequent
//! operations can emit structured diagnostics via `tracing`.

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;

use loam_cli::{
    cli::{Cli, CliError, render_payload, run_cli},
    logging::{self, LoggingError},
};
use tracing::error;

fn try_main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let payload = run_cli(cli)?;
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    render_payload(&payload, &mut writer)?;
    writer
        .flush()
        .map_err(|source| CliError::Render { source })?;
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = logging::init_logging() {
        report_logging_init_error(&err);
        return ExitCode::FAILURE;
    }

    if let Err(err) = try_main() {
        let code = match &err {
            CliError::Core(core) => Some(core.code().as_str()),
            _ => None,
        };
        error!(error = %err, code = ?code, "command execution failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Emit a fallback diagnostic to stderr when tracing initialisation
/// fails.
#[expect(
    clippy::print_stderr,
    reason = "Emit one-off diagnostic before tracing is initialized"
)]
fn report_logging_init_error(err: &LoggingError) {
    eprintln!("failed to initialize logging: {err}");
}
