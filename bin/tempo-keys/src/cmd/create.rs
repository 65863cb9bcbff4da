use super::{ChainArgs, RootKeyArgs, SubmitArgs, VaultPathArgs, parse_token_limit};
use clap::Parser;
use eyre::{Context as _, ensure};
use tempo_access_keys::{CreateKeyRequest, Overlay};
use tempo_primitives::{SignatureType, TokenLimit};
use tempo_telemetry_util::display_unix_seconds;

#[derive(Parser, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    root: RootKeyArgs,

    #[command(flatten)]
    vault: VaultPathArgs,

    #[command(flatten)]
    submit: SubmitArgs,

    /// Curve of the new key: `p256` or `secp256k1`.
    #[arg(long, default_value_t = SignatureType::P256)]
    key_type: SignatureType,

    /// Time the key stops being valid, e.g. `2026-12-31T00:00:00Z`. Never expires if omitted.
    #[arg(long)]
    expiry: Option<jiff::Timestamp>,

    /// Spending limit as `<token>=<amount>`; repeat for several tokens.
    #[arg(long = "limit", value_parser = parse_token_limit)]
    limits: Vec<TokenLimit>,
}

impl CreateArgs {
    pub async fn run(self) -> eyre::Result<()> {
        let root = &self.root.root_key;
        let account = self.chain.account(Some(root))?;

        let expiry = match self.expiry {
            Some(expiry) => {
                ensure!(expiry > jiff::Timestamp::now(), "expiry {expiry} is in the past");
                u64::try_from(expiry.as_second()).wrap_err("expiry is before the unix epoch")?
            }
            None => 0,
        };

        let signer = self.submit.signer(
            self.chain.ledger().await?,
            self.vault.open(),
            Overlay::shared(),
            account,
        );
        let created = signer
            .create_key(
                root,
                CreateKeyRequest {
                    key_type: self.key_type,
                    expiry,
                    limits: self.limits,
                },
            )
            .await
            .wrap_err("failed creating access key")?;

        println!(
            "authorized {} key {} for {} (expires {}) in block {}, tx {}",
            self.key_type,
            created.key_id,
            account,
            display_unix_seconds(expiry),
            created.inclusion.block_number,
            created.inclusion.transaction_hash,
        );
        println!("private key stored in {}", self.vault.path.display());
        Ok(())
    }
}
