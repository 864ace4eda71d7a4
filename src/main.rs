use std::panic;
use std::process::ExitCode;

use clap::Parser;
use http_o11y::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        tracing::error!(%panic_info, "Panic occurred");
        default_hook(panic_info);
    }));

    match http_o11y::run_server(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
