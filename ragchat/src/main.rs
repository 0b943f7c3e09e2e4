use clap::Parser;
use ragchat_lib::cli::CliArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    ragchat_lib::run(args).await
}
