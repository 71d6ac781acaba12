use std::process::ExitCode;

fn main() -> ExitCode {
    il2c_rs::run_cli()
}
