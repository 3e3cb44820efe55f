use clap::Parser;
use po_ingest::cli::{run, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the report and the exit diagnostic.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => {
            tracing::info!("CLI completed successfully");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            println!("Error encountered. Message:'{e:#}'");
            std::process::exit(1);
        }
    }
}
