use std::process::ExitCode;

fn main() -> ExitCode {
    insights_cli::run()
}
