use std::process::ExitCode;

fn main() -> ExitCode {
    switchboard_cli::logging::init();
    switchboard_cli::run()
}
