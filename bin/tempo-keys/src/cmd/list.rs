use super::{ChainArgs, PollArgs, print_snapshot};
use clap::Parser;
use eyre::OptionExt as _;
use tempo_access_keys::KeychainService;

#[derive(Parser, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    poll: PollArgs,

    /// Print the snapshot as JSON.
    #[arg(long)]
    json: bool,
}

impl ListArgs {
    pub async fn run(self) -> eyre::Result<()> {
        let account = self.chain.account(None)?;
        let service = KeychainService::new(self.chain.ledger().await?, self.poll.config());

        let snapshot = service
            .poll_once(account)
            .await?
            .ok_or_eyre("a poll for this account is already running")?;
        print_snapshot(&snapshot, self.json)
    }
}
