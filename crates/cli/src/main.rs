use std::process::ExitCode;

fn main() -> ExitCode {
    tradebook_cli::run()
}
