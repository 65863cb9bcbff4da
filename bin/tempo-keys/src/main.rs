use crate::opts::{TempoKeys, TempoKeysSubcommand};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cmd;
mod opts;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = TempoKeys::parse();

    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match args.cmd {
        TempoKeysSubcommand::List(cmd) => cmd.run().await,
        TempoKeysSubcommand::Watch(cmd) => cmd.run().await,
        TempoKeysSubcommand::Create(cmd) => cmd.run().await,
        TempoKeysSubcommand::Transfer(cmd) => cmd.run().await,
        TempoKeysSubcommand::Revoke(cmd) => cmd.run().await,
        TempoKeysSubcommand::Vault(cmd) => cmd.run(),
    }
}
