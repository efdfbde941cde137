/// Pacer CLI
///
/// Answers questions about a running log with generated analysis code,
/// and exposes the sandbox and dataset tooling directly.

use pacer_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
