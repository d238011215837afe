use std::process::ExitCode;

fn main() -> ExitCode {
    marketrank_cli::run()
}
