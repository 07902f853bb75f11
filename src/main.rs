use anyhow::Result;
use clap::Parser;
use opsconsole::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    opsconsole::run(args).await
}
