use alloy::{
    primitives::{Address, U256},
    signers::local::PrivateKeySigner,
};
use clap::Args;
use eyre::{Context as _, OptionExt as _};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tempo_access_keys::{
    DelegatedSigner, FileKeyStore, KeySnapshot, KeyVault, KeyView, LimitAbi, OracleConfig,
    RpcLedger, SharedOverlay, SignerConfig, SubscriptionConfig,
    log_reader::MAX_LOOKBACK_WINDOW,
};
use tempo_contracts::precompiles::DEFAULT_FEE_TOKEN;
use tempo_primitives::TokenLimit;
use tempo_telemetry_util::display_unix_seconds;

pub mod create;
pub mod list;
pub mod revoke;
pub mod transfer;
pub mod vault;
pub mod watch;

#[derive(Args, Debug, Clone)]
pub struct ChainArgs {
    /// JSON-RPC endpoint of a Tempo node.
    #[arg(long, env = "TEMPO_RPC_URL", default_value = "http://localhost:8545")]
    pub rpc_url: String,

    /// Account whose access keys are managed. Defaults to the root key's address.
    #[arg(long, env = "TEMPO_ACCOUNT")]
    pub account: Option<Address>,
}

impl ChainArgs {
    pub async fn ledger(&self) -> eyre::Result<Arc<RpcLedger>> {
        let ledger = RpcLedger::connect(&self.rpc_url)
            .await
            .wrap_err_with(|| format!("failed connecting to `{}`", self.rpc_url))?;
        Ok(Arc::new(ledger))
    }

    pub fn account(&self, root: Option<&PrivateKeySigner>) -> eyre::Result<Address> {
        self.account
            .or_else(|| root.map(|root| root.address()))
            .ok_or_eyre("no account given; pass --account or set TEMPO_ACCOUNT")
    }
}

#[derive(Args, Debug, Clone)]
pub struct VaultPathArgs {
    /// JSON file holding the private keys of access keys created on this device.
    #[arg(long = "vault", env = "TEMPO_KEYS_VAULT", default_value = "access-keys.json")]
    pub path: PathBuf,
}

impl VaultPathArgs {
    pub fn open(&self) -> KeyVault {
        KeyVault::new(FileKeyStore::new(&self.path))
    }
}

#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    /// Number of recent blocks searched for keychain events.
    #[arg(long, default_value_t = MAX_LOOKBACK_WINDOW)]
    pub lookback_window: u64,

    /// Seconds between polls.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Maximum remaining-limit reads in flight per key.
    #[arg(long, default_value_t = 4)]
    pub limit_concurrency: usize,

    /// Read remaining limits through the legacy `spendingLimit` call.
    #[arg(long)]
    pub legacy_limits: bool,
}

impl PollArgs {
    pub fn config(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            poll_interval: Duration::from_secs(self.poll_interval),
            lookback_window: self.lookback_window,
            oracle: OracleConfig {
                concurrency: self.limit_concurrency.max(1),
                abi: if self.legacy_limits {
                    LimitAbi::Legacy
                } else {
                    LimitAbi::Current
                },
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Token transaction fees are paid in.
    #[arg(long, default_value_t = DEFAULT_FEE_TOKEN)]
    pub fee_token: Address,

    /// Seconds to wait for a submitted transaction to be included.
    #[arg(long, default_value_t = 30)]
    pub inclusion_timeout: u64,
}

impl SubmitArgs {
    pub fn config(&self) -> SignerConfig {
        SignerConfig {
            fee_token: self.fee_token,
            inclusion_timeout: Duration::from_secs(self.inclusion_timeout),
            ..Default::default()
        }
    }

    pub fn signer(
        &self,
        ledger: Arc<RpcLedger>,
        vault: KeyVault,
        overlay: SharedOverlay,
        account: Address,
    ) -> DelegatedSigner<RpcLedger> {
        DelegatedSigner::new(ledger, vault, overlay, account, self.config())
    }
}

#[derive(Args, Debug, Clone)]
pub struct RootKeyArgs {
    /// Hex encoded secp256k1 private key of the account.
    #[arg(long, env = "TEMPO_ROOT_KEY", hide_env_values = true)]
    pub root_key: PrivateKeySigner,
}

/// Parses `<token>=<amount>`.
pub fn parse_token_limit(value: &str) -> Result<TokenLimit, String> {
    let (token, limit) = value
        .split_once('=')
        .ok_or_else(|| format!("expected <token>=<amount>, got `{value}`"))?;
    Ok(TokenLimit {
        token: token
            .trim()
            .parse()
            .map_err(|error| format!("invalid token address `{token}`: {error}"))?,
        limit: limit
            .trim()
            .parse::<U256>()
            .map_err(|error| format!("invalid amount `{limit}`: {error}"))?,
    })
}

pub fn print_snapshot(snapshot: &KeySnapshot, json: bool) -> eyre::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    println!(
        "account {} at block {}{}",
        snapshot.account,
        snapshot.block,
        if snapshot.degraded {
            " (incomplete: some event queries failed)"
        } else {
            ""
        }
    );
    let views = snapshot.views();
    if views.is_empty() {
        println!("  no access keys");
    }
    for view in views {
        match view {
            KeyView::Pending(pending) => {
                print!(
                    "  pending   {}  expires {}",
                    pending.key_id,
                    display_unix_seconds(pending.expiry)
                );
                if let (Some(token), Some(limit)) =
                    (pending.token_address, pending.spending_limit)
                {
                    print!("  limit {limit} of {token}");
                }
                println!();
            }
            KeyView::Confirmed { key, revoking } => {
                println!(
                    "  {}  {}  {}  expires {}  created {}",
                    if revoking { "revoking" } else { "active  " },
                    key.key_id,
                    key.signature_type,
                    display_unix_seconds(key.expiry),
                    key.created_at.map_or_else(
                        || "unknown".to_string(),
                        |at| display_unix_seconds(at).to_string(),
                    ),
                );
                for (token, original) in &key.original_limits {
                    match key.spending_limits.get(token) {
                        Some(remaining) => {
                            println!("      {token}: {remaining} of {original} remaining")
                        }
                        None => println!("      {token}: exhausted or unknown of {original}"),
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        poll: PollArgs,
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert!(Cli::try_parse_from(["tempo-keys", "--poll-interval", "0"]).is_err());

        let cli = Cli::try_parse_from(["tempo-keys", "--poll-interval", "3"]).unwrap();
        assert_eq!(cli.poll.config().poll_interval, Duration::from_secs(3));
    }

    #[test]
    fn token_limits_parse() {
        let limit = parse_token_limit("0x20C0000000000000000000000000000000000001=1000").unwrap();
        assert_eq!(limit.token, address!("0x20C0000000000000000000000000000000000001"));
        assert_eq!(limit.limit, U256::from(1000));

        assert!(parse_token_limit("0x20C0000000000000000000000000000000000001").is_err());
        assert!(parse_token_limit("nope=5").is_err());
    }
}
