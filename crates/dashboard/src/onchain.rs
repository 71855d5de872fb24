//! Implementations of the contract boundary traits on top of an alloy
//! provider.

use {
    crate::{
        admins::{RoleChange, RoleEvent},
        quote::PoolReserves,
        registry::EntryInfo,
        traits::{
            LogQuerying,
            PoolReading,
            PoolTrading,
            RegistryReading,
            RegistryWriting,
            TokenMetadata,
            TokenReading,
            TokenWriting,
        },
    },
    alloy::{
        contract::Error as ContractError,
        network::Ethereum,
        primitives::{Address, B256, U256},
        providers::{PendingTransactionBuilder, Provider},
        rpc::types::{Filter, FilterSet, Log},
        sol_types::SolEvent,
    },
    anyhow::{Context, Result, ensure},
    contracts::alloy::{
        DashboardToken,
        StateManager::{
            self,
            StateManager::{RoleGranted, RoleRevoked},
        },
        SwapPool,
    },
    ethrpc::{
        AlloyProvider,
        BlockRange,
        alloy::errors::{CallFailure, ContractErrorExt},
    },
};

/// Talks to the deployed contracts through a single provider. Writes are
/// signed by the provider's wallet, if it has one.
#[derive(Clone)]
pub struct Onchain {
    provider: AlloyProvider,
}

impl Onchain {
    pub fn new(provider: AlloyProvider) -> Self {
        Self { provider }
    }

    fn token(&self, address: Address) -> DashboardToken::Instance {
        DashboardToken::Instance::new(address, self.provider.clone())
    }

    fn pool(&self, address: Address) -> SwapPool::Instance {
        SwapPool::Instance::new(address, self.provider.clone())
    }

    fn registry(&self, address: Address) -> StateManager::Instance {
        StateManager::Instance::new(address, self.provider.clone())
    }
}

/// Adds whether the node or the contract is to blame to a failed call.
fn call_error(method: &str, err: ContractError) -> anyhow::Error {
    let failure = err.classify();
    let err = anyhow::Error::new(err);
    match failure {
        CallFailure::Node => err.context(format!("node failed to execute {method}")),
        CallFailure::Reverted => err.context(format!("{method} reverted")),
    }
}

/// Waits for a sent transaction to be mined and fails if it reverted.
async fn confirm(method: &str, pending: PendingTransactionBuilder<Ethereum>) -> Result<B256> {
    let receipt = pending
        .get_receipt()
        .await
        .with_context(|| format!("failed to get {method} receipt"))?;
    ensure!(
        receipt.status(),
        "{method} transaction {} reverted",
        receipt.transaction_hash
    );
    tracing::debug!(method, tx = %receipt.transaction_hash, "transaction mined");
    Ok(receipt.transaction_hash)
}

/// Decodes a `RoleGranted` or `RoleRevoked` log. Logs that are not mined
/// yet or fail to decode are ignored.
fn decode_role_event(log: &Log) -> Option<RoleEvent> {
    let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
        tracing::debug!(?log, "ignoring pending log");
        return None;
    };
    let topic = log.topic0()?;
    let (change, role, account) = if *topic == RoleGranted::SIGNATURE_HASH {
        let event = log.log_decode::<RoleGranted>().ok()?.inner.data;
        (RoleChange::Granted, event.role, event.account)
    } else if *topic == RoleRevoked::SIGNATURE_HASH {
        let event = log.log_decode::<RoleRevoked>().ok()?.inner.data;
        (RoleChange::Revoked, event.role, event.account)
    } else {
        return None;
    };
    Some(RoleEvent {
        change,
        role,
        account,
        block_number,
        log_index,
    })
}

#[async_trait::async_trait]
impl LogQuerying for Onchain {
    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("failed to fetch current block number")
    }

    async fn role_events(
        &self,
        contract: Address,
        role: B256,
        range: BlockRange,
    ) -> Result<Vec<RoleEvent>> {
        let filter = Filter::new()
            .address(contract)
            .event_signature(FilterSet::from_iter([
                RoleGranted::SIGNATURE_HASH,
                RoleRevoked::SIGNATURE_HASH,
            ]))
            .topic1(role)
            .from_block(range.start())
            .to_block(range.end());
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .with_context(|| format!("failed to fetch role events in {range}"))?;
        Ok(logs.iter().filter_map(decode_role_event).collect())
    }
}

#[async_trait::async_trait]
impl PoolReading for Onchain {
    async fn reserves(&self, pool: Address, quote_asset: Address) -> Result<PoolReserves> {
        let reserves = self
            .pool(pool)
            .getReserves(quote_asset)
            .call()
            .await
            .map_err(|err| call_error("getReserves", err))?;
        Ok(PoolReserves::new(reserves.quoteReserve, reserves.baseReserve))
    }

    async fn fee_rate(&self, pool: Address) -> Result<U256> {
        self.pool(pool)
            .feeRate()
            .call()
            .await
            .map_err(|err| call_error("feeRate", err))
    }
}

#[async_trait::async_trait]
impl PoolTrading for Onchain {
    async fn swap_quote_for_base(
        &self,
        pool: Address,
        amount_in: U256,
        min_amount_out: U256,
    ) -> Result<B256> {
        let pending = self
            .pool(pool)
            .swapQuoteForBase(amount_in, min_amount_out)
            .send()
            .await
            .map_err(|err| call_error("swapQuoteForBase", err))?;
        confirm("swapQuoteForBase", pending).await
    }

    async fn swap_base_for_quote(
        &self,
        pool: Address,
        amount_in: U256,
        min_amount_out: U256,
    ) -> Result<B256> {
        let pending = self
            .pool(pool)
            .swapBaseForQuote(amount_in, min_amount_out)
            .send()
            .await
            .map_err(|err| call_error("swapBaseForQuote", err))?;
        confirm("swapBaseForQuote", pending).await
    }
}

#[async_trait::async_trait]
impl TokenReading for Onchain {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        self.token(token)
            .balanceOf(owner)
            .call()
            .await
            .map_err(|err| call_error("balanceOf", err))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        self.token(token)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|err| call_error("allowance", err))
    }

    async fn metadata(&self, token: Address) -> Result<TokenMetadata> {
        let token = self.token(token);
        let symbol = token.symbol();
        let decimals = token.decimals();
        let (symbol, decimals) = futures::try_join!(
            async { symbol.call().await.map_err(|err| call_error("symbol", err)) },
            async { decimals.call().await.map_err(|err| call_error("decimals", err)) },
        )?;
        Ok(TokenMetadata { symbol, decimals })
    }
}

#[async_trait::async_trait]
impl TokenWriting for Onchain {
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<B256> {
        let pending = self
            .token(token)
            .approve(spender, amount)
            .send()
            .await
            .map_err(|err| call_error("approve", err))?;
        confirm("approve", pending).await
    }

    async fn mint(&self, token: Address, to: Address, amount: U256) -> Result<B256> {
        let pending = self
            .token(token)
            .mint(to, amount)
            .send()
            .await
            .map_err(|err| call_error("mint", err))?;
        confirm("mint", pending).await
    }
}

#[async_trait::async_trait]
impl RegistryReading for Onchain {
    async fn exists(&self, registry: Address, key: B256) -> Result<bool> {
        self.registry(registry)
            .exists(key)
            .call()
            .await
            .map_err(|err| call_error("exists", err))
    }

    async fn entry_info(&self, registry: Address, key: B256) -> Result<EntryInfo> {
        let info = self
            .registry(registry)
            .getEntryInfo(key)
            .call()
            .await
            .map_err(|err| call_error("getEntryInfo", err))?;
        Ok(EntryInfo {
            value_type: info.valueType,
            permission: info.requiredPermission,
            immutable: info.isImmutable,
        })
    }

    async fn get_address(&self, registry: Address, key: B256) -> Result<Address> {
        self.registry(registry)
            .getAddress(key)
            .call()
            .await
            .map_err(|err| call_error("getAddress", err))
    }

    async fn get_uint(&self, registry: Address, key: B256) -> Result<U256> {
        self.registry(registry)
            .getUint(key)
            .call()
            .await
            .map_err(|err| call_error("getUint", err))
    }

    async fn get_bool(&self, registry: Address, key: B256) -> Result<bool> {
        self.registry(registry)
            .getBool(key)
            .call()
            .await
            .map_err(|err| call_error("getBool", err))
    }

    async fn get_bytes32(&self, registry: Address, key: B256) -> Result<B256> {
        self.registry(registry)
            .getBytes32(key)
            .call()
            .await
            .map_err(|err| call_error("getBytes32", err))
    }

    async fn has_role(&self, registry: Address, role: B256, account: Address) -> Result<bool> {
        self.registry(registry)
            .hasRole(role, account)
            .call()
            .await
            .map_err(|err| call_error("hasRole", err))
    }
}

#[async_trait::async_trait]
impl RegistryWriting for Onchain {
    async fn set_address(
        &self,
        registry: Address,
        key: B256,
        value: Address,
        permission: B256,
    ) -> Result<B256> {
        let pending = self
            .registry(registry)
            .setAddress(key, value, permission)
            .send()
            .await
            .map_err(|err| call_error("setAddress", err))?;
        confirm("setAddress", pending).await
    }

    async fn set_uint(
        &self,
        registry: Address,
        key: B256,
        value: U256,
        permission: B256,
    ) -> Result<B256> {
        let pending = self
            .registry(registry)
            .setUint(key, value, permission)
            .send()
            .await
            .map_err(|err| call_error("setUint", err))?;
        confirm("setUint", pending).await
    }

    async fn set_bool(
        &self,
        registry: Address,
        key: B256,
        value: bool,
        permission: B256,
    ) -> Result<B256> {
        let pending = self
            .registry(registry)
            .setBool(key, value, permission)
            .send()
            .await
            .map_err(|err| call_error("setBool", err))?;
        confirm("setBool", pending).await
    }

    async fn set_bytes32(
        &self,
        registry: Address,
        key: B256,
        value: B256,
        permission: B256,
    ) -> Result<B256> {
        let pending = self
            .registry(registry)
            .setBytes32(key, value, permission)
            .send()
            .await
            .map_err(|err| call_error("setBytes32", err))?;
        confirm("setBytes32", pending).await
    }
}
