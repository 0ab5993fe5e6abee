use std::process::ExitCode;

use sitetext::Error;

#[tokio::main]
async fn main() -> ExitCode {
    match sitetext::run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err @ Error::Config(_)) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
