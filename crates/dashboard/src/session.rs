//! The dashboard session: all user visible state plus the messages that
//! change it.
//!
//! State is only modified through [`Session::handle`], which turns every
//! outcome, including failures, into a [`Status`] for the user. Nothing that
//! goes wrong with a single operation ends the session.

use {
    crate::{
        admins::{
            ADMIN_ROLE,
            AdminScan,
            AdminSetReconstructor,
            cancellation::CancellationHandle,
            scanner::ScanConfig,
        },
        error::{Error, Result, Setting, ValidationError},
        onchain::Onchain,
        quote::{FeeRate, PoolReserves, SwapDirection, SwapQuote},
        registry::{
            EntryId,
            EntryValue,
            Registry,
            RegistryEntry,
            ValueType,
            parse_address,
            parse_permission,
        },
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
    alloy::primitives::{Address, U256},
    anyhow::anyhow,
    number::units::{check_amount_syntax, format_token_amount, parse_token_amount},
    std::{fmt, sync::Arc},
};

/// Handles to every contract boundary the session talks to.
#[derive(Clone)]
pub struct Clients {
    pub pool: Arc<dyn PoolReading>,
    pub trading: Arc<dyn PoolTrading>,
    pub tokens: Arc<dyn TokenReading>,
    pub token_admin: Arc<dyn TokenWriting>,
    pub registry: Arc<dyn RegistryReading>,
    pub registry_admin: Arc<dyn RegistryWriting>,
    pub logs: Arc<dyn LogQuerying>,
}

impl Clients {
    pub fn onchain(onchain: Onchain) -> Self {
        let onchain = Arc::new(onchain);
        Self {
            pool: onchain.clone(),
            trading: onchain.clone(),
            tokens: onchain.clone(),
            token_admin: onchain.clone(),
            registry: onchain.clone(),
            registry_admin: onchain.clone(),
            logs: onchain,
        }
    }
}

/// Deployed contract addresses. Each one is optional so that operations
/// that don't need a contract keep working without it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContractAddresses {
    pub quote_token: Option<Address>,
    pub base_token: Option<Address>,
    pub treasury: Option<Address>,
    pub pool: Option<Address>,
    pub state_manager: Option<Address>,
}

impl ContractAddresses {
    pub fn quote_token(&self) -> Result<Address> {
        self.quote_token
            .ok_or(Error::Configuration(Setting::QuoteToken))
    }

    pub fn base_token(&self) -> Result<Address> {
        self.base_token.ok_or(Error::Configuration(Setting::BaseToken))
    }

    pub fn pool(&self) -> Result<Address> {
        self.pool.ok_or(Error::Configuration(Setting::Pool))
    }

    pub fn state_manager(&self) -> Result<Address> {
        self.state_manager
            .ok_or(Error::Configuration(Setting::StateManager))
    }

    /// Address of the token sold in `direction`.
    pub fn input_token(&self, direction: SwapDirection) -> Result<Address> {
        match direction {
            SwapDirection::QuoteToBase => self.quote_token(),
            SwapDirection::BaseToQuote => self.base_token(),
        }
    }
}

/// One of the two pool assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Asset {
    Quote,
    Base,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub quote: TokenMetadata,
    pub base: TokenMetadata,
}

impl TokenPair {
    pub fn get(&self, asset: Asset) -> &TokenMetadata {
        match asset {
            Asset::Quote => &self.quote,
            Asset::Base => &self.base,
        }
    }

    pub fn input(&self, direction: SwapDirection) -> &TokenMetadata {
        match direction {
            SwapDirection::QuoteToBase => &self.quote,
            SwapDirection::BaseToQuote => &self.base,
        }
    }

    pub fn output(&self, direction: SwapDirection) -> &TokenMetadata {
        self.input(direction.toggled())
    }
}

/// Balances of one account in both pool assets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Holdings {
    pub quote: U256,
    pub base: U256,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balances {
    /// `None` without a connected wallet.
    pub wallet: Option<Holdings>,
    /// `None` if no treasury is configured.
    pub treasury: Option<Holdings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub reserves: PoolReserves,
    pub fee: FeeRate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok(String),
    Failed(String),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok(message) => f.write_str(message),
            Status::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    /// The connected wallet, if any.
    pub account: Option<Address>,
    pub direction: SwapDirection,
    /// Amount to sell as typed by the user, in whole token units.
    pub amount_input: String,
    pub tokens: Option<TokenPair>,
    pub balances: Option<Balances>,
    pub pool: Option<PoolSnapshot>,
    /// Quote for `amount_input` against `pool`, `None` if either is missing
    /// or the input does not parse.
    pub quote: Option<SwapQuote>,
    /// Registry entries the user asked for.
    pub registry_ids: Vec<EntryId>,
    pub registry_entries: Vec<RegistryEntry>,
    /// Result of the last admin role check of `account`.
    pub is_admin: Option<bool>,
    pub admins: Option<AdminScan>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Reload token metadata, pool state and balances.
    Refresh,
    SetAmount(String),
    ToggleDirection,
    /// Swap the current amount, approving the pool first if needed.
    ExecuteSwap,
    /// Load the given registry entries, by label or raw hash.
    LoadRegistry(Vec<String>),
    WriteEntry {
        id: String,
        value_type: ValueType,
        value: String,
        permission: Option<String>,
    },
    AssignModule {
        name: String,
        module: String,
    },
    Mint {
        asset: Asset,
        /// Defaults to the connected wallet.
        to: Option<String>,
        amount: String,
    },
    LoadAdmins,
}

impl Message {
    fn name(&self) -> &'static str {
        match self {
            Message::Refresh => "refresh",
            Message::SetAmount(_) => "set_amount",
            Message::ToggleDirection => "toggle_direction",
            Message::ExecuteSwap => "execute_swap",
            Message::LoadRegistry(_) => "load_registry",
            Message::WriteEntry { .. } => "write_entry",
            Message::AssignModule { .. } => "assign_module",
            Message::Mint { .. } => "mint",
            Message::LoadAdmins => "load_admins",
        }
    }
}

pub struct Session {
    clients: Clients,
    addresses: ContractAddresses,
    reconstructor: AdminSetReconstructor,
    cancel: CancellationHandle,
    state: SessionState,
}

impl Session {
    pub fn new(
        clients: Clients,
        addresses: ContractAddresses,
        account: Option<Address>,
        scan: ScanConfig,
        cancel: CancellationHandle,
    ) -> Self {
        let reconstructor = AdminSetReconstructor::new(clients.logs.clone(), scan);
        Self {
            clients,
            addresses,
            reconstructor,
            cancel,
            state: SessionState {
                account,
                ..Default::default()
            },
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Applies `message` and records the outcome as the current status.
    pub async fn handle(&mut self, message: Message) -> Status {
        let name = message.name();
        tracing::debug!(operation = name, "handling message");
        let result = match message {
            Message::Refresh => self.refresh().await,
            Message::SetAmount(input) => self.set_amount(input).await,
            Message::ToggleDirection => self.toggle_direction(),
            Message::ExecuteSwap => self.execute_swap().await,
            Message::LoadRegistry(ids) => self.load_registry(ids).await,
            Message::WriteEntry {
                id,
                value_type,
                value,
                permission,
            } => {
                self.write_entry(&id, value_type, &value, permission.as_deref())
                    .await
            }
            Message::AssignModule { name, module } => self.assign_module(&name, &module).await,
            Message::Mint { asset, to, amount } => {
                self.mint(asset, to.as_deref(), &amount).await
            }
            Message::LoadAdmins => self.load_admins().await,
        };
        let status = match result {
            Ok(summary) => {
                tracing::info!(operation = name, %summary, "operation succeeded");
                Status::Ok(summary)
            }
            Err(err) => {
                tracing::warn!(operation = name, %err, "operation failed");
                Status::Failed(err.to_string())
            }
        };
        self.state.status = Some(status.clone());
        status
    }

    async fn refresh(&mut self) -> Result<String> {
        self.load_market().await?;
        self.load_balances().await?;
        Ok("refreshed balances and pool state".to_string())
    }

    async fn set_amount(&mut self, input: String) -> Result<String> {
        self.state.amount_input = input;
        let syntax = match self.state.amount_input.trim() {
            "" => Ok(()),
            input => check_amount(input),
        };
        if let Err(err) = syntax {
            self.state.quote = None;
            return Err(err.into());
        }
        self.ensure_market().await?;
        self.update_quote()?;
        match (&self.state.quote, &self.state.tokens) {
            (Some(quote), Some(tokens)) => Ok(describe_quote(quote, tokens)),
            _ => Ok("amount cleared".to_string()),
        }
    }

    fn toggle_direction(&mut self) -> Result<String> {
        self.state.direction = self.state.direction.toggled();
        // The input is now read in units of the other token.
        self.update_quote()?;
        Ok(match &self.state.tokens {
            Some(tokens) => format!(
                "selling {} for {}",
                tokens.input(self.state.direction).symbol,
                tokens.output(self.state.direction).symbol
            ),
            None => format!("direction set to {:?}", self.state.direction),
        })
    }

    async fn execute_swap(&mut self) -> Result<String> {
        let account = self.account()?;
        let pool = self.addresses.pool()?;
        let direction = self.state.direction;
        let token_in = self.addresses.input_token(direction)?;

        // Quote against the latest reserves, not the ones shown earlier.
        self.load_market().await?;
        self.update_quote()?;
        let quote = self.state.quote.ok_or(ValidationError::NoQuote)?;
        if quote.amount_in.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }

        let allowance = self
            .clients
            .tokens
            .allowance(token_in, account, pool)
            .await?;
        if allowance < quote.amount_in {
            tracing::info!(%allowance, amount = %quote.amount_in, "approving pool");
            self.clients
                .token_admin
                .approve(token_in, pool, quote.amount_in)
                .await?;
        }

        let transaction = match direction {
            SwapDirection::QuoteToBase => {
                self.clients
                    .trading
                    .swap_quote_for_base(pool, quote.amount_in, quote.min_amount_out)
                    .await?
            }
            SwapDirection::BaseToQuote => {
                self.clients
                    .trading
                    .swap_base_for_quote(pool, quote.amount_in, quote.min_amount_out)
                    .await?
            }
        };

        let summary = match &self.state.tokens {
            Some(tokens) => {
                let (token_in, token_out) = (tokens.input(direction), tokens.output(direction));
                format!(
                    "swapped {} {} for at least {} {} in {transaction}",
                    format_token_amount(quote.amount_in, token_in.decimals),
                    token_in.symbol,
                    format_token_amount(quote.min_amount_out, token_out.decimals),
                    token_out.symbol,
                )
            }
            None => format!("swapped in {transaction}"),
        };
        self.refresh_after_write().await;
        Ok(summary)
    }

    async fn load_registry(&mut self, ids: Vec<String>) -> Result<String> {
        let ids = ids
            .iter()
            .map(|id| EntryId::parse(id))
            .collect::<Result<Vec<_>, _>>()?;
        let entries = self.registry()?.load_entries(&ids).await?;
        let message = format!("loaded {} of {} registry entries", entries.len(), ids.len());
        self.state.registry_ids = ids;
        self.state.registry_entries = entries;
        Ok(message)
    }

    async fn write_entry(
        &mut self,
        id: &str,
        value_type: ValueType,
        value: &str,
        permission: Option<&str>,
    ) -> Result<String> {
        let id = EntryId::parse(id)?;
        let value = EntryValue::parse(value_type, value)?;
        let permission = permission.map(parse_permission).transpose()?;
        let registry = self.registry()?;
        self.require_admin().await?;

        let written = registry
            .write_entry(&id, value, permission, &self.state.registry_ids)
            .await?;
        self.remember_written(id.clone(), written.entries);
        Ok(format!("set {id} to {value} in {}", written.transaction))
    }

    async fn assign_module(&mut self, name: &str, module: &str) -> Result<String> {
        let id = EntryId::module(name)?;
        let module = parse_address(module)?;
        let registry = self.registry()?;
        self.require_admin().await?;

        let written = registry
            .assign_module(name, module, &self.state.registry_ids)
            .await?;
        self.remember_written(id, written.entries);
        Ok(format!(
            "assigned module {} to {module} in {}",
            name.trim(),
            written.transaction
        ))
    }

    async fn mint(&mut self, asset: Asset, to: Option<&str>, amount: &str) -> Result<String> {
        let to = match to {
            Some(to) => parse_address(to)?,
            None => self.account()?,
        };
        check_amount(amount)?;
        let token = match asset {
            Asset::Quote => self.addresses.quote_token()?,
            Asset::Base => self.addresses.base_token()?,
        };
        let metadata = match &self.state.tokens {
            Some(tokens) => tokens.get(asset).clone(),
            None => self.clients.tokens.metadata(token).await?,
        };
        let amount = parse_amount(amount, metadata.decimals)?;
        if amount.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        self.require_admin().await?;

        let transaction = self.clients.token_admin.mint(token, to, amount).await?;
        self.refresh_after_write().await;
        Ok(format!(
            "minted {} {} to {to} in {transaction}",
            format_token_amount(amount, metadata.decimals),
            metadata.symbol
        ))
    }

    async fn load_admins(&mut self) -> Result<String> {
        let state_manager = self.addresses.state_manager()?;
        let scan = self
            .reconstructor
            .reconstruct(state_manager, *ADMIN_ROLE, &self.cancel)
            .await;
        let result = match &scan {
            AdminScan::Complete {
                admins,
                skipped_blocks,
                ..
            } if skipped_blocks.is_empty() => Ok(format!("found {} admins", admins.len())),
            AdminScan::Complete {
                admins,
                skipped_blocks,
                ..
            } => Ok(format!(
                "found {} admins, {} blocks could not be scanned",
                admins.len(),
                skipped_blocks.len()
            )),
            AdminScan::Partial { admins, reason, .. } => Ok(format!(
                "found {} admins in a partial scan ({reason})",
                admins.len()
            )),
            AdminScan::Undetermined { reason } => Err(Error::Provider(anyhow!(
                "admin set could not be determined: {reason}"
            ))),
        };
        self.state.admins = Some(scan);
        result
    }

    fn account(&self) -> Result<Address> {
        self.state
            .account
            .ok_or(Error::Configuration(Setting::Wallet))
    }

    fn registry(&self) -> Result<Registry> {
        Ok(Registry::new(
            self.addresses.state_manager()?,
            self.clients.registry.clone(),
            self.clients.registry_admin.clone(),
        ))
    }

    /// Fails unless the connected wallet holds the admin role right now.
    async fn require_admin(&mut self) -> Result<()> {
        let account = self.account()?;
        let state_manager = self.addresses.state_manager()?;
        let is_admin = self
            .clients
            .registry
            .has_role(state_manager, *ADMIN_ROLE, account)
            .await?;
        self.state.is_admin = Some(is_admin);
        if !is_admin {
            return Err(Error::Unauthorized { account });
        }
        Ok(())
    }

    fn remember_written(&mut self, id: EntryId, entries: Vec<RegistryEntry>) {
        if !self.state.registry_ids.contains(&id) {
            self.state.registry_ids.push(id);
        }
        self.state.registry_entries = entries;
    }

    async fn ensure_market(&mut self) -> Result<()> {
        if self.state.tokens.is_none() || self.state.pool.is_none() {
            self.load_market().await?;
        }
        Ok(())
    }

    /// Reloads token metadata and the pool snapshot and requotes.
    async fn load_market(&mut self) -> Result<()> {
        let quote_token = self.addresses.quote_token()?;
        let base_token = self.addresses.base_token()?;
        let pool = self.addresses.pool()?;

        let tokens = &self.clients.tokens;
        let reader = &self.clients.pool;
        let (quote, base, reserves, fee) = futures::try_join!(
            tokens.metadata(quote_token),
            tokens.metadata(base_token),
            reader.reserves(pool, quote_token),
            reader.fee_rate(pool),
        )?;
        self.state.tokens = Some(TokenPair { quote, base });
        self.state.pool = Some(PoolSnapshot {
            reserves,
            fee: FeeRate::from_onchain(fee),
        });
        if let Err(err) = self.update_quote() {
            tracing::debug!(%err, "stored amount no longer parses");
        }
        Ok(())
    }

    async fn load_balances(&mut self) -> Result<()> {
        let wallet = match self.state.account {
            Some(account) => Some(self.holdings(account).await?),
            None => None,
        };
        let treasury = match self.addresses.treasury {
            Some(treasury) => Some(self.holdings(treasury).await?),
            None => None,
        };
        self.state.balances = Some(Balances { wallet, treasury });
        Ok(())
    }

    async fn holdings(&self, owner: Address) -> Result<Holdings> {
        let quote_token = self.addresses.quote_token()?;
        let base_token = self.addresses.base_token()?;
        let tokens = &self.clients.tokens;
        let (quote, base) = futures::try_join!(
            tokens.balance_of(quote_token, owner),
            tokens.balance_of(base_token, owner),
        )?;
        Ok(Holdings { quote, base })
    }

    /// State changed on chain; a failed reload must not turn the successful
    /// write into a failure.
    async fn refresh_after_write(&mut self) {
        if let Err(err) = self.refresh().await {
            tracing::warn!(%err, "failed to refresh after transaction");
        }
    }

    /// Recomputes the quote from the current input, direction and pool.
    fn update_quote(&mut self) -> Result<(), ValidationError> {
        self.state.quote = None;
        let (Some(tokens), Some(pool)) = (&self.state.tokens, self.state.pool) else {
            return Ok(());
        };
        if self.state.amount_input.trim().is_empty() {
            return Ok(());
        }
        let decimals = tokens.input(self.state.direction).decimals;
        let amount_in = parse_amount(&self.state.amount_input, decimals)?;
        self.state.quote = Some(SwapQuote::new(
            pool.reserves,
            pool.fee,
            self.state.direction,
            amount_in,
        ));
        Ok(())
    }
}

/// Rejects input that can't be an amount of any token.
fn check_amount(input: &str) -> Result<(), ValidationError> {
    check_amount_syntax(input).map_err(|err| ValidationError::Amount {
        input: input.to_string(),
        reason: format!("{err:#}"),
    })
}

fn parse_amount(input: &str, decimals: u8) -> Result<U256, ValidationError> {
    parse_token_amount(input, decimals).map_err(|err| ValidationError::Amount {
        input: input.to_string(),
        reason: format!("{err:#}"),
    })
}

fn describe_quote(quote: &SwapQuote, tokens: &TokenPair) -> String {
    let (token_in, token_out) = (
        tokens.input(quote.direction),
        tokens.output(quote.direction),
    );
    format!(
        "{} {} buys about {} {} (at least {})",
        format_token_amount(quote.amount_in, token_in.decimals),
        token_in.symbol,
        format_token_amount(quote.amount_out, token_out.decimals),
        token_out.symbol,
        format_token_amount(quote.min_amount_out, token_out.decimals),
    )
}
