use clap::Parser;
use tracing_subscriber::EnvFilter;

use mrl_runner::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    mrl_runner::run(args).await?;

    Ok(())
}
