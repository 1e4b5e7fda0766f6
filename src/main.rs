use std::process::ExitCode;

use e_keyfall::cli::run_cli;

fn main() -> ExitCode {
    run_cli()
}
