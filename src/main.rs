//! Instantly CLI entry point
//!
//! Everything else lives in the `cli` module.

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine
    dotenvy::dotenv().ok();
    cli::run().await
}
