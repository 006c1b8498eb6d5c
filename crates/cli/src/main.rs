use std::process::ExitCode;

fn main() -> ExitCode {
    coachline_cli::run()
}
