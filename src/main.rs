//! dirmatch - directory tree comparison
//!
//! Entry point for the dirmatch CLI application.

use clap::Parser;
use dirmatch::{
    cli::Cli,
    error::{ExitCode, StructuredError},
    index::IndexError,
};

fn main() {
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    match dirmatch::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            let exit_code = if err
                .downcast_ref::<IndexError>()
                .is_some_and(|e| matches!(e, IndexError::Interrupted))
            {
                ExitCode::Interrupted
            } else {
                ExitCode::GeneralError
            };

            if json_errors {
                let structured = StructuredError::new(&err, exit_code);
                if let Ok(json) = serde_json::to_string_pretty(&structured) {
                    eprintln!("{}", json);
                } else {
                    eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
                }
            } else {
                eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
            }

            std::process::exit(exit_code.as_i32());
        }
    }
}
