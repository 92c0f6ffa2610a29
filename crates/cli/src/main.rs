use std::process::ExitCode;

fn main() -> ExitCode {
    cityhall_cli::run()
}
