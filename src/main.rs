use std::process::ExitCode;

use clap::Parser;
use serde_json::json;

use assistant_backend::cli::{self, Cli};
use assistant_backend::core::errors::ApiError;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err
                .downcast_ref::<ApiError>()
                .map(ApiError::kind)
                .unwrap_or("internal");
            let log = format!("{:?}", err);
            println!(
                "{}",
                json!({"error": format!("{:#}", err), "kind": kind, "log": log})
            );
            ExitCode::FAILURE
        }
    }
}
