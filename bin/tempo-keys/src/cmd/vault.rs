use super::VaultPathArgs;
use clap::Parser;
use eyre::Context as _;
use tempo_telemetry_util::error_field;

#[derive(Parser, Debug)]
pub struct VaultArgs {
    #[command(flatten)]
    vault: VaultPathArgs,
}

impl VaultArgs {
    pub fn run(self) -> eyre::Result<()> {
        let vault = self.vault.open();
        let keys = vault
            .list()
            .wrap_err_with(|| format!("failed reading {}", self.vault.path.display()))?;

        if keys.is_empty() {
            println!("no access keys stored in {}", self.vault.path.display());
        }
        for key_id in keys {
            match vault.load_material(key_id) {
                Ok(material) => println!("{key_id}  {}", material.key_type()),
                Err(error) => {
                    tracing::warn!(%key_id, error = error_field(&error), "unusable vault entry");
                    println!("{key_id}  unusable");
                }
            }
        }
        Ok(())
    }
}
