//! Trait definitions for the external contract boundaries.
//!
//! Every trait method maps to exactly one on-chain function (or one node
//! RPC) so that the rest of the crate can be tested with mocks. State
//! changing methods only return once the transaction is mined and return its
//! hash.

use {
    crate::{admins::RoleEvent, quote::PoolReserves, registry::EntryInfo},
    alloy::primitives::{Address, B256, U256},
    anyhow::Result,
    ethrpc::BlockRange,
};

/// Symbol and decimals of a token, needed to parse and display amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

/// Historical event logs and chain head.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LogQuerying: Send + Sync {
    /// Number of the most recent block.
    async fn block_number(&self) -> Result<u64>;

    /// All `RoleGranted` and `RoleRevoked` events for `role` emitted by
    /// `contract` within `range`. Providers may reject large ranges.
    async fn role_events(
        &self,
        contract: Address,
        role: B256,
        range: BlockRange,
    ) -> Result<Vec<RoleEvent>>;
}

/// Read access to the swap pool.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PoolReading: Send + Sync {
    /// `getReserves(quoteAsset)`
    async fn reserves(&self, pool: Address, quote_asset: Address) -> Result<PoolReserves>;

    /// `feeRate()`, unclamped.
    async fn fee_rate(&self, pool: Address) -> Result<U256>;
}

/// Swap execution against the pool.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PoolTrading: Send + Sync {
    /// `swapQuoteForBase(amountIn, minAmountOut)`
    async fn swap_quote_for_base(
        &self,
        pool: Address,
        amount_in: U256,
        min_amount_out: U256,
    ) -> Result<B256>;

    /// `swapBaseForQuote(amountIn, minAmountOut)`
    async fn swap_base_for_quote(
        &self,
        pool: Address,
        amount_in: U256,
        min_amount_out: U256,
    ) -> Result<B256>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenReading: Send + Sync {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    /// `symbol()` and `decimals()`
    async fn metadata(&self, token: Address) -> Result<TokenMetadata>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenWriting: Send + Sync {
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<B256>;

    /// Mints test tokens. Only admins may call this.
    async fn mint(&self, token: Address, to: Address, amount: U256) -> Result<B256>;
}

/// Read access to the state manager registry.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RegistryReading: Send + Sync {
    async fn exists(&self, registry: Address, key: B256) -> Result<bool>;

    /// Stored value type, required permission and immutability of an entry.
    async fn entry_info(&self, registry: Address, key: B256) -> Result<EntryInfo>;

    async fn get_address(&self, registry: Address, key: B256) -> Result<Address>;

    async fn get_uint(&self, registry: Address, key: B256) -> Result<U256>;

    async fn get_bool(&self, registry: Address, key: B256) -> Result<bool>;

    async fn get_bytes32(&self, registry: Address, key: B256) -> Result<B256>;

    async fn has_role(&self, registry: Address, role: B256, account: Address) -> Result<bool>;
}

/// Typed setters of the state manager registry. Every setter takes the
/// permission that will be required to change the entry afterwards.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RegistryWriting: Send + Sync {
    async fn set_address(
        &self,
        registry: Address,
        key: B256,
        value: Address,
        permission: B256,
    ) -> Result<B256>;

    async fn set_uint(
        &self,
        registry: Address,
        key: B256,
        value: U256,
        permission: B256,
    ) -> Result<B256>;

    async fn set_bool(
        &self,
        registry: Address,
        key: B256,
        value: bool,
        permission: B256,
    ) -> Result<B256>;

    async fn set_bytes32(
        &self,
        registry: Address,
        key: B256,
        value: B256,
        permission: B256,
    ) -> Result<B256>;
}
