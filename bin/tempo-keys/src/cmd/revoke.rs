use super::{ChainArgs, RootKeyArgs, SubmitArgs, VaultPathArgs};
use alloy::primitives::Address;
use clap::Parser;
use eyre::Context as _;
use tempo_access_keys::Overlay;

#[derive(Parser, Debug)]
pub struct RevokeArgs {
    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    root: RootKeyArgs,

    #[command(flatten)]
    vault: VaultPathArgs,

    #[command(flatten)]
    submit: SubmitArgs,

    /// Access key to revoke.
    #[arg(long)]
    key: Address,
}

impl RevokeArgs {
    pub async fn run(self) -> eyre::Result<()> {
        let root = &self.root.root_key;
        let account = self.chain.account(Some(root))?;
        let signer = self.submit.signer(
            self.chain.ledger().await?,
            self.vault.open(),
            Overlay::shared(),
            account,
        );

        let inclusion = signer
            .revoke(root, self.key)
            .await
            .wrap_err_with(|| format!("failed revoking {}", self.key))?;
        println!(
            "revoked {} for {} in block {}, tx {}",
            self.key, account, inclusion.block_number, inclusion.transaction_hash
        );
        Ok(())
    }
}
