use std::process::ExitCode;

fn main() -> ExitCode {
    match defectcheck::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}
