use super::{ChainArgs, SubmitArgs, VaultPathArgs};
use alloy::primitives::{Address, U256};
use clap::Parser;
use eyre::Context as _;
use tempo_access_keys::Overlay;

#[derive(Parser, Debug)]
pub struct TransferArgs {
    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    vault: VaultPathArgs,

    #[command(flatten)]
    submit: SubmitArgs,

    /// Access key that signs the transfer.
    #[arg(long)]
    key: Address,

    /// TIP-20 token to send.
    #[arg(long)]
    token: Address,

    /// Recipient.
    #[arg(long)]
    to: Address,

    /// Amount in the token's base units.
    #[arg(long)]
    amount: U256,
}

impl TransferArgs {
    pub async fn run(self) -> eyre::Result<()> {
        let account = self.chain.account(None)?;
        let signer = self.submit.signer(
            self.chain.ledger().await?,
            self.vault.open(),
            Overlay::shared(),
            account,
        );

        let inclusion = signer
            .transfer(self.key, self.token, self.to, self.amount)
            .await
            .wrap_err("transfer failed")?;
        println!(
            "sent {} of {} to {} in block {}, tx {}",
            self.amount, self.token, self.to, inclusion.block_number, inclusion.transaction_hash
        );
        Ok(())
    }
}
