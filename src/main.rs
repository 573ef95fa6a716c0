use std::process::ExitCode;

use krakenpipe::cli;

fn main() -> ExitCode {
    cli::run_cli()
}
