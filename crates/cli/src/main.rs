use std::process::ExitCode;

fn main() -> ExitCode {
    shopfloor_cli::run()
}
