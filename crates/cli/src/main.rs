use std::process::ExitCode;

fn main() -> ExitCode {
    agendai_cli::run()
}
