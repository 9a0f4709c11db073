/// Greenroom CLI
///
/// Runs the built-in demo and stage-plan playback without requiring an
/// embedding host. Diagnostics go to stderr so piped snapshot output on
/// stdout stays clean; set RUST_LOG to adjust verbosity.
use tracing_subscriber::EnvFilter;

use greenroom::cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
