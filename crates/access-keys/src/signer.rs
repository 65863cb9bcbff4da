//! Building, signing and submitting Tempo transactions for an account.

use crate::{
    error::{CreationState, LedgerError, SignerError},
    keys::AccessKeyMaterial,
    ledger::{GetKeyRequest, Inclusion, KeychainLedger},
    overlay::SharedOverlay,
    types::{PendingKey, is_expired, unix_now},
    vault::KeyVault,
};
use alloy::{
    eips::Encodable2718 as _,
    primitives::{Address, B256, TxKind, U256},
    signers::{SignerSync as _, local::PrivateKeySigner},
    sol_types::SolCall,
};
use std::{sync::Arc, time::Duration};
use tempo_contracts::precompiles::{
    ACCOUNT_KEYCHAIN_ADDRESS, DEFAULT_FEE_TOKEN, IAccountKeychain, ITIP20,
};
use tempo_primitives::{
    Call, KeyAuthorization, KeychainSignature, PrimitiveSignature, SignatureType,
    SignedKeyAuthorization, TempoSignature, TempoTransaction, TokenLimit,
};
use tempo_telemetry_util::{display_unix_seconds, error_field};
use tracing::{debug, info, instrument, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerConfig {
    /// Token every transaction pays its fees in.
    pub fee_token: Address,
    /// Gas limit of the transaction carrying a key authorization.
    pub create_gas_limit: u64,
    /// Gas limit of spend and revoke transactions.
    pub call_gas_limit: u64,
    pub inclusion_timeout: Duration,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            fee_token: DEFAULT_FEE_TOKEN,
            create_gas_limit: 2_000_000,
            call_gas_limit: 500_000,
            inclusion_timeout: Duration::from_secs(30),
        }
    }
}

/// Parameters of a new access key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateKeyRequest {
    pub key_type: SignatureType,
    /// Unix seconds; `0` never expires.
    pub expiry: u64,
    pub limits: Vec<TokenLimit>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedKey {
    pub key_id: Address,
    pub inclusion: Inclusion,
}

/// Signs on behalf of one account, either with its root key or with an access
/// key held in the local vault.
///
/// Every submission waits for inclusion. The overlay is updated before
/// submitting and rolled back when the submission fails.
pub struct DelegatedSigner<L> {
    ledger: Arc<L>,
    vault: KeyVault,
    overlay: SharedOverlay,
    account: Address,
    config: SignerConfig,
}

impl<L: KeychainLedger> DelegatedSigner<L> {
    pub fn new(
        ledger: Arc<L>,
        vault: KeyVault,
        overlay: SharedOverlay,
        account: Address,
        config: SignerConfig,
    ) -> Self {
        Self {
            ledger,
            vault,
            overlay,
            account,
            config,
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn vault(&self) -> &KeyVault {
        &self.vault
    }

    /// Generates an access key, stores it, and has `root` authorize it on chain.
    ///
    /// The key is stored before anything is signed and stays in the vault when
    /// any later step fails.
    #[instrument(skip_all, fields(account = %self.account, key_type = %request.key_type))]
    pub async fn create_key(
        &self,
        root: &PrivateKeySigner,
        request: CreateKeyRequest,
    ) -> Result<CreatedKey, SignerError> {
        self.ensure_root(root)?;
        let fail = |state: CreationState, source: SignerError| SignerError::Creation {
            state,
            source: Box::new(source),
        };

        let material = AccessKeyMaterial::generate(request.key_type)
            .map_err(|error| fail(CreationState::Idle, error.into()))?;
        let key_id = self
            .vault
            .store_material(&material)
            .map_err(|error| fail(CreationState::Idle, error.into()))?;
        let mut state = CreationState::KeypairStored;
        debug!(%key_id, "stored new access key");

        let first_limit = request.limits.first();
        self.overlay.lock().add_pending(PendingKey {
            key_id,
            expiry: request.expiry,
            token_address: first_limit.map(|limit| limit.token),
            spending_limit: first_limit.map(|limit| limit.limit),
        });

        match self
            .authorize_and_submit(root, &material, &request, &mut state)
            .await
        {
            Ok(inclusion) => {
                info!(
                    %key_id,
                    block = inclusion.block_number,
                    expiry = %display_unix_seconds(request.expiry),
                    "access key authorized"
                );
                Ok(CreatedKey { key_id, inclusion })
            }
            Err(error) => {
                self.overlay.lock().remove_pending(key_id);
                warn!(
                    %key_id,
                    %state,
                    error = error_field(&error),
                    "access key creation failed; key kept in vault"
                );
                Err(fail(state, error))
            }
        }
    }

    async fn authorize_and_submit(
        &self,
        root: &PrivateKeySigner,
        material: &AccessKeyMaterial,
        request: &CreateKeyRequest,
        state: &mut CreationState,
    ) -> Result<Inclusion, SignerError> {
        let chain_id = self.ledger.chain_id().await?;
        let authorization = KeyAuthorization {
            chain_id,
            key_type: material.key_type(),
            key_id: material.key_id(),
            expiry: request.expiry,
            limits: request.limits.clone(),
        };
        let authorization = sign_authorization(root, authorization)?;
        *state = CreationState::AuthorizationSigned;

        let probe = Call {
            to: TxKind::Call(self.config.fee_token),
            value: U256::ZERO,
            input: ITIP20::balanceOfCall {
                account: self.account,
            }
            .abi_encode()
            .into(),
        };
        let tx = self
            .build_transaction(
                chain_id,
                vec![probe],
                self.config.create_gas_limit,
                Some(authorization),
            )
            .await?;
        let signature = self.sign_as_access_key(material, &tx)?;

        let hash = self.send(tx, signature).await?;
        *state = CreationState::Submitted;
        let inclusion = self.confirm(hash).await?;
        *state = CreationState::Confirmed;
        Ok(inclusion)
    }

    /// Transfers `amount` of the TIP-20 `token` to `to`, signed by an access key.
    pub async fn transfer(
        &self,
        key_id: Address,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<Inclusion, SignerError> {
        let call = Call {
            to: TxKind::Call(token),
            value: U256::ZERO,
            input: ITIP20::transferCall { to, amount }.abi_encode().into(),
        };
        self.execute(key_id, vec![call]).await
    }

    /// Executes `calls` signed by the access key `key_id` from the local vault.
    ///
    /// Fails without touching the network when the key is not on this device.
    #[instrument(skip_all, fields(account = %self.account, %key_id))]
    pub async fn execute(
        &self,
        key_id: Address,
        calls: Vec<Call>,
    ) -> Result<Inclusion, SignerError> {
        let material = self.load_key(key_id)?;
        self.preflight(key_id).await?;

        let chain_id = self.ledger.chain_id().await?;
        let tx = self
            .build_transaction(chain_id, calls, self.config.call_gas_limit, None)
            .await?;
        let signature = self.sign_as_access_key(&material, &tx)?;
        let hash = self.send(tx, signature).await?;
        self.confirm(hash).await
    }

    /// Revokes `key_id` with the root key.
    ///
    /// The key is shown as revoking until the ledger drops it, or until the
    /// submission fails.
    #[instrument(skip_all, fields(account = %self.account, %key_id))]
    pub async fn revoke(
        &self,
        root: &PrivateKeySigner,
        key_id: Address,
    ) -> Result<Inclusion, SignerError> {
        self.ensure_root(root)?;
        self.overlay.lock().mark_revoking(key_id);

        let result = self.submit_revocation(root, key_id).await;
        match &result {
            Ok(inclusion) => info!(block = inclusion.block_number, "access key revoked"),
            Err(error) => {
                self.overlay.lock().unmark_revoking(key_id);
                warn!(error = error_field(error), "revocation failed");
            }
        }
        result
    }

    async fn submit_revocation(
        &self,
        root: &PrivateKeySigner,
        key_id: Address,
    ) -> Result<Inclusion, SignerError> {
        let chain_id = self.ledger.chain_id().await?;
        let call = Call {
            to: TxKind::Call(ACCOUNT_KEYCHAIN_ADDRESS),
            value: U256::ZERO,
            input: IAccountKeychain::revokeKeyCall { keyId: key_id }
                .abi_encode()
                .into(),
        };
        let tx = self
            .build_transaction(chain_id, vec![call], self.config.call_gas_limit, None)
            .await?;
        let signature = root
            .sign_hash_sync(&tx.signature_hash())
            .map_err(SignerError::Signing)?;

        let hash = self.send(tx, signature.into()).await?;
        self.confirm(hash).await
    }

    fn ensure_root(&self, root: &PrivateKeySigner) -> Result<(), SignerError> {
        let root = root.address();
        if root != self.account {
            return Err(SignerError::RootMismatch {
                account: self.account,
                root,
            });
        }
        Ok(())
    }

    /// Imports the vault entry of `key_id` and checks it derives the same address.
    fn load_key(&self, key_id: Address) -> Result<AccessKeyMaterial, SignerError> {
        let material = self.vault.load_material(key_id)?;
        let derived = material.key_id();
        if derived != key_id {
            return Err(SignerError::KeyMismatch {
                expected: key_id,
                derived,
            });
        }
        Ok(material)
    }

    async fn preflight(&self, key_id: Address) -> Result<(), SignerError> {
        let key = self
            .ledger
            .get_key(GetKeyRequest {
                account: self.account,
                key_id,
            })
            .await?;

        if !key.exists() {
            return Err(SignerError::KeyNotAuthorized(key_id));
        }
        if key.is_revoked {
            return Err(SignerError::KeyRevoked(key_id));
        }
        if is_expired(key.expiry, unix_now()) {
            return Err(SignerError::KeyExpired {
                key_id,
                expiry: key.expiry,
            });
        }
        Ok(())
    }

    async fn build_transaction(
        &self,
        chain_id: u64,
        calls: Vec<Call>,
        gas_limit: u64,
        key_authorization: Option<SignedKeyAuthorization>,
    ) -> Result<TempoTransaction, SignerError> {
        let (nonce, fees) = tokio::try_join!(
            self.ledger.transaction_count(self.account),
            self.ledger.fee_estimate(),
        )?;

        let tx = TempoTransaction {
            chain_id,
            fee_token: Some(self.config.fee_token),
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            gas_limit,
            calls,
            nonce,
            key_authorization,
            ..Default::default()
        };
        tx.validate().map_err(SignerError::InvalidTransaction)?;
        Ok(tx)
    }

    fn sign_as_access_key(
        &self,
        material: &AccessKeyMaterial,
        tx: &TempoTransaction,
    ) -> Result<TempoSignature, SignerError> {
        let inner = material.sign_hash(&tx.signature_hash())?;
        Ok(TempoSignature::Keychain(KeychainSignature::new(
            self.account,
            inner,
        )))
    }

    async fn send(
        &self,
        tx: TempoTransaction,
        signature: TempoSignature,
    ) -> Result<B256, SignerError> {
        let signed = tx.into_signed(signature);
        let hash = self
            .ledger
            .send_raw_transaction(signed.encoded_2718().into())
            .await?;
        debug!(%hash, nonce = signed.tx().nonce, "submitted transaction");
        Ok(hash)
    }

    async fn confirm(&self, hash: B256) -> Result<Inclusion, SignerError> {
        let inclusion = self
            .ledger
            .wait_for_inclusion(hash, self.config.inclusion_timeout)
            .await?;
        if !inclusion.success {
            return Err(LedgerError::TransactionReverted {
                hash,
                block: inclusion.block_number,
            }
            .into());
        }
        Ok(inclusion)
    }
}

/// Root signature over a key authorization.
fn sign_authorization(
    root: &PrivateKeySigner,
    authorization: KeyAuthorization,
) -> Result<SignedKeyAuthorization, SignerError> {
    let signature = root
        .sign_hash_sync(&authorization.signature_hash())
        .map_err(SignerError::Signing)?;
    Ok(authorization.into_signed(PrimitiveSignature::Secp256k1(signature)))
}
