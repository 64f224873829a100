use cluster_settings::cli::start;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match start::start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
