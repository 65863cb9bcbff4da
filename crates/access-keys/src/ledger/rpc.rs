use super::{
    BlockRange, FeeEstimate, GetKeyRequest, GetKeyResponse, Inclusion, KeyAuthorizedEvent,
    KeyRevokedEvent, KeychainLedger, LogPosition, RemainingLimitRequest, RemainingLimitResponse,
    SpendingLimitUpdatedEvent,
};
use crate::error::LedgerError;
use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256, Bytes, U64},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::Filter,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tempo_contracts::precompiles::{
    ACCOUNT_KEYCHAIN_ADDRESS, AccountKeychainError, IAccountKeychain, IAccountKeychainLegacy,
};
use tracing::{debug, instrument};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// [`KeychainLedger`] backed by a JSON-RPC provider.
///
/// Blocks and receipts are read through raw requests so that Tempo specific
/// transaction and receipt types never have to be decoded.
#[derive(Clone, Debug)]
pub struct RpcLedger<P = DynProvider> {
    provider: P,
    receipt_poll_interval: Duration,
}

impl RpcLedger {
    pub async fn connect(rpc_url: &str) -> Result<Self, LedgerError> {
        let provider = ProviderBuilder::new().connect(rpc_url).await?.erased();
        Ok(Self::new(provider))
    }
}

impl<P: Provider> RpcLedger<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            receipt_poll_interval: RECEIPT_POLL_INTERVAL,
        }
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    async fn keychain_logs<E: SolEvent>(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<(E, LogPosition)>, LedgerError> {
        let filter = Filter::new()
            .address(ACCOUNT_KEYCHAIN_ADDRESS)
            .event_signature(E::SIGNATURE_HASH)
            .topic1(account.into_word())
            .from_block(range.from)
            .to_block(range.to);

        let logs = self.provider.get_logs(&filter).await?;
        debug!(event = E::SIGNATURE, count = logs.len(), "fetched keychain logs");

        logs.into_iter()
            .map(|log| {
                let position = LogPosition {
                    block_number: log.block_number.unwrap_or_default(),
                    log_index: log.log_index.unwrap_or_default(),
                };
                let decoded =
                    log.log_decode::<E>()
                        .map_err(|source| LedgerError::UndecodableLog {
                            what: E::SIGNATURE,
                            block: position.block_number,
                            source,
                        })?;
                Ok((decoded.inner.data, position))
            })
            .collect()
    }
}

fn contract_error(error: alloy::contract::Error) -> LedgerError {
    match error.as_decoded_interface_error::<AccountKeychainError>() {
        Some(revert) => LedgerError::Reverted(revert.describe()),
        None => LedgerError::Contract(error),
    }
}

#[derive(Debug, Deserialize)]
struct BlockTimestamp {
    timestamp: U64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptStatus {
    transaction_hash: B256,
    block_number: U64,
    status: U64,
}

#[async_trait]
impl<P: Provider + 'static> KeychainLedger for RpcLedger<P> {
    async fn latest_block(&self) -> Result<u64, LedgerError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn key_authorized_events(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<KeyAuthorizedEvent>, LedgerError> {
        let logs = self
            .keychain_logs::<IAccountKeychain::KeyAuthorized>(account, range)
            .await?;
        Ok(logs
            .into_iter()
            .map(|(event, position)| KeyAuthorizedEvent {
                account: event.account,
                key_id: event.publicKey,
                signature_type: event.signatureType,
                expiry: event.expiry,
                position,
            })
            .collect())
    }

    async fn key_revoked_events(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<KeyRevokedEvent>, LedgerError> {
        let logs = self
            .keychain_logs::<IAccountKeychain::KeyRevoked>(account, range)
            .await?;
        Ok(logs
            .into_iter()
            .map(|(event, position)| KeyRevokedEvent {
                account: event.account,
                key_id: event.publicKey,
                position,
            })
            .collect())
    }

    async fn spending_limit_events(
        &self,
        account: Address,
        range: BlockRange,
    ) -> Result<Vec<SpendingLimitUpdatedEvent>, LedgerError> {
        let logs = self
            .keychain_logs::<IAccountKeychain::SpendingLimitUpdated>(account, range)
            .await?;
        Ok(logs
            .into_iter()
            .map(|(event, position)| SpendingLimitUpdatedEvent {
                account: event.account,
                key_id: event.publicKey,
                token: event.token,
                new_limit: event.newLimit,
                position,
            })
            .collect())
    }

    async fn get_key(&self, request: GetKeyRequest) -> Result<GetKeyResponse, LedgerError> {
        let keychain = IAccountKeychain::new(ACCOUNT_KEYCHAIN_ADDRESS, &self.provider);
        let info = keychain
            .getKey(request.account, request.key_id)
            .call()
            .await
            .map_err(contract_error)?;

        Ok(GetKeyResponse {
            signature_type: info.signatureType as u8,
            key_id: info.keyId,
            expiry: info.expiry,
            enforce_limits: info.enforceLimits,
            is_revoked: info.isRevoked,
        })
    }

    async fn remaining_limit(
        &self,
        request: RemainingLimitRequest,
    ) -> Result<RemainingLimitResponse, LedgerError> {
        let keychain = IAccountKeychain::new(ACCOUNT_KEYCHAIN_ADDRESS, &self.provider);
        let remaining = keychain
            .getRemainingLimit(request.account, request.key_id, request.token)
            .call()
            .await
            .map_err(contract_error)?;
        Ok(RemainingLimitResponse { remaining })
    }

    async fn legacy_spending_limit(
        &self,
        request: RemainingLimitRequest,
    ) -> Result<RemainingLimitResponse, LedgerError> {
        let keychain = IAccountKeychainLegacy::new(ACCOUNT_KEYCHAIN_ADDRESS, &self.provider);
        let remaining = keychain
            .spendingLimit(request.account, request.key_id, request.token)
            .call()
            .await
            .map_err(contract_error)?;
        Ok(RemainingLimitResponse { remaining })
    }

    async fn block_timestamp(&self, block: u64) -> Result<Option<u64>, LedgerError> {
        let header: Option<BlockTimestamp> = self
            .provider
            .raw_request(
                "eth_getBlockByNumber".into(),
                (BlockNumberOrTag::Number(block), false),
            )
            .await?;
        Ok(header.map(|header| header.timestamp.to::<u64>()))
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError> {
        let estimate = self.provider.estimate_eip1559_fees().await?;
        Ok(FeeEstimate {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<B256, LedgerError> {
        let pending = self.provider.send_raw_transaction(&encoded).await?;
        Ok(*pending.tx_hash())
    }

    #[instrument(skip(self), err)]
    async fn wait_for_inclusion(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<Inclusion, LedgerError> {
        let poll = async {
            loop {
                let receipt: Option<ReceiptStatus> = self
                    .provider
                    .raw_request("eth_getTransactionReceipt".into(), [hash])
                    .await?;
                if let Some(receipt) = receipt {
                    return Ok::<_, LedgerError>(Inclusion {
                        transaction_hash: receipt.transaction_hash,
                        block_number: receipt.block_number.to::<u64>(),
                        success: receipt.status == U64::from(1),
                    });
                }
                tokio::time::sleep(self.receipt_poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| LedgerError::InclusionTimeout(hash))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        primitives::{U256, address},
        providers::mock::Asserter,
        rpc::types::Log,
        sol_types::SolCall,
    };

    fn ledger(asserter: &Asserter) -> RpcLedger<DynProvider> {
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        RpcLedger::new(provider).with_receipt_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn reads_latest_block() -> eyre::Result<()> {
        let asserter = Asserter::new();
        asserter.push_success(&U64::from(1234));

        assert_eq!(ledger(&asserter).latest_block().await?, 1234);
        Ok(())
    }

    #[tokio::test]
    async fn decodes_key_authorized_logs() -> eyre::Result<()> {
        let account = address!("0x00000000000000000000000000000000000000aa");
        let key_id = address!("0x00000000000000000000000000000000000000bb");
        let event = IAccountKeychain::KeyAuthorized {
            account,
            publicKey: key_id,
            signatureType: 1,
            expiry: 0,
        };
        let log = Log {
            inner: alloy::primitives::Log {
                address: ACCOUNT_KEYCHAIN_ADDRESS,
                data: event.encode_log_data(),
            },
            block_number: Some(100),
            log_index: Some(3),
            ..Default::default()
        };

        let asserter = Asserter::new();
        asserter.push_success(&vec![log]);

        let events = ledger(&asserter)
            .key_authorized_events(account, BlockRange::ending_at(200, 99_000))
            .await?;
        assert_eq!(
            events,
            vec![KeyAuthorizedEvent {
                account,
                key_id,
                signature_type: 1,
                expiry: 0,
                position: LogPosition {
                    block_number: 100,
                    log_index: 3,
                },
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn reads_remaining_limit() -> eyre::Result<()> {
        let asserter = Asserter::new();
        asserter.push_success(&Bytes::from(
            IAccountKeychain::getRemainingLimitCall::abi_encode_returns(&U256::from(250)),
        ));

        let response = ledger(&asserter)
            .remaining_limit(RemainingLimitRequest {
                account: Address::repeat_byte(0xaa),
                key_id: Address::repeat_byte(0xbb),
                token: Address::repeat_byte(0xcc),
            })
            .await?;
        assert_eq!(response.remaining, U256::from(250));
        Ok(())
    }

    #[tokio::test]
    async fn transport_failures_surface_as_transient() {
        let asserter = Asserter::new();
        asserter.push_failure_msg("upstream unavailable");

        let error = ledger(&asserter).latest_block().await.unwrap_err();
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn waits_for_receipt() -> eyre::Result<()> {
        let hash = B256::repeat_byte(0x42);
        let asserter = Asserter::new();
        asserter.push_success(&serde_json::Value::Null);
        asserter.push_success(&serde_json::json!({
            "transactionHash": hash,
            "blockNumber": "0x10",
            "status": "0x1",
        }));

        let inclusion = ledger(&asserter)
            .wait_for_inclusion(hash, Duration::from_secs(5))
            .await?;
        assert_eq!(inclusion.block_number, 16);
        assert!(inclusion.success);
        Ok(())
    }
}
