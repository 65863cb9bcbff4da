use crate::cmd::{
    create::CreateArgs, list::ListArgs, revoke::RevokeArgs, transfer::TransferArgs,
    vault::VaultArgs, watch::WatchArgs,
};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct TempoKeys {
    #[command(subcommand)]
    pub cmd: TempoKeysSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum TempoKeysSubcommand {
    /// Print the access keys of an account once.
    List(ListArgs),
    /// Keep printing the access keys of an account as they change.
    Watch(WatchArgs),
    /// Generate an access key and authorize it with the root key.
    Create(CreateArgs),
    /// Send TIP-20 tokens signed by an access key from the local vault.
    Transfer(TransferArgs),
    /// Revoke an access key with the root key.
    Revoke(RevokeArgs),
    /// List the access keys stored on this device.
    Vault(VaultArgs),
}
