use anyhow::Result;
use clap::Parser;
use opdpost::cli::Cli;
use opdpost::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    cli.run().await
}
