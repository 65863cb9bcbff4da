use super::{ChainArgs, PollArgs, print_snapshot};
use clap::Parser;
use eyre::Context as _;
use tempo_access_keys::KeychainService;
use tokio::signal;

#[derive(Parser, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    poll: PollArgs,

    /// Print every snapshot as JSON.
    #[arg(long)]
    json: bool,
}

impl WatchArgs {
    pub async fn run(self) -> eyre::Result<()> {
        let account = self.chain.account(None)?;
        let service = KeychainService::new(self.chain.ledger().await?, self.poll.config());
        let mut subscription = service.subscribe(account);

        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("failed to install SIGINT handler")?;

        loop {
            tokio::select! {
                snapshot = subscription.changed() => {
                    let snapshot = snapshot.context("subscription task stopped")?;
                    print_snapshot(&snapshot, self.json)?;
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, shutting down gracefully");
                    break;
                }
            }
        }
        Ok(())
    }
}
