use {
    crate::{
        admins::{pacing::Backoff, scanner::ScanConfig},
        quote::SwapDirection,
        registry::ValueType,
        session::{Asset, ContractAddresses},
    },
    alloy::primitives::Address,
    std::{
        fmt::{self, Display, Formatter},
        time::Duration,
    },
    tracing::level_filters::LevelFilter,
    url::Url,
};

#[derive(clap::Parser)]
#[clap(version, about = "Command line dashboard for the token, pool and registry contracts")]
pub struct Arguments {
    #[clap(flatten)]
    pub logging: LoggingArguments,

    #[clap(flatten)]
    pub admin_scan: AdminScanArguments,

    /// The Ethereum node URL to connect to.
    #[clap(long, env, default_value = "http://localhost:8545")]
    pub node_url: Url,

    /// Token sold when swapping in the default direction.
    #[clap(long, env)]
    pub quote_token_address: Option<Address>,

    /// Token bought when swapping in the default direction.
    #[clap(long, env)]
    pub base_token_address: Option<Address>,

    /// Account whose balances are shown next to the wallet's.
    #[clap(long, env)]
    pub treasury_address: Option<Address>,

    #[clap(long, env)]
    pub pool_address: Option<Address>,

    /// The registry holding configuration entries and the admin role.
    #[clap(long, env)]
    pub state_manager_address: Option<Address>,

    /// Hex encoded key of the wallet used to sign transactions. Without it
    /// only read-only commands work.
    #[clap(long, env, hide_env_values = true)]
    pub private_key: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Parser)]
pub struct LoggingArguments {
    #[clap(long, env, default_value = "warn,dashboard=info,ethrpc=info")]
    pub log_filter: String,

    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: LevelFilter,

    /// Emit logs as JSON lines.
    #[clap(long, env, default_value = "false")]
    pub use_json_logs: bool,
}

/// Limits of the historical log scan that reconstructs the admin set.
#[derive(clap::Parser)]
pub struct AdminScanArguments {
    /// Number of most recent blocks that are scanned.
    #[clap(long, env, default_value = "50000")]
    pub admin_scan_window: u64,

    /// Block range of the first log requests. Halved on failure.
    #[clap(long, env, default_value = "2000")]
    pub admin_scan_initial_step: u64,

    /// Minimum time between the starts of two log requests.
    #[clap(long, env, default_value = "1s", value_parser = humantime::parse_duration)]
    pub admin_scan_request_interval: Duration,

    #[clap(long, env, default_value = "500")]
    pub admin_scan_max_requests: u32,

    #[clap(long, env, default_value = "10")]
    pub admin_scan_max_consecutive_failures: u32,

    /// Retries of a single block before it is skipped.
    #[clap(long, env, default_value = "3")]
    pub admin_scan_block_retries: u32,

    #[clap(long, env, default_value = "200ms", value_parser = humantime::parse_duration)]
    pub admin_scan_initial_backoff: Duration,

    #[clap(long, env, default_value = "2s", value_parser = humantime::parse_duration)]
    pub admin_scan_max_backoff: Duration,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Show wallet, treasury and pool balances.
    Balances,
    /// Quote a swap without executing it.
    Quote {
        /// Amount to sell, in whole tokens (e.g. `1.5`).
        amount: String,
        #[clap(long, value_enum, default_value_t)]
        direction: SwapDirection,
    },
    /// Swap with a 2% slippage guard, approving the pool first if needed.
    Swap {
        amount: String,
        #[clap(long, value_enum, default_value_t)]
        direction: SwapDirection,
    },
    #[clap(subcommand)]
    Registry(RegistryCommand),
    /// Point a governance module at a new address. Requires the admin role.
    AssignModule {
        name: String,
        module: String,
    },
    /// Mint test tokens. Requires the admin role.
    Mint {
        #[clap(value_enum)]
        asset: Asset,
        amount: String,
        /// Recipient, defaults to the connected wallet.
        #[clap(long)]
        to: Option<String>,
    },
    /// Reconstruct the admin set from recent role events.
    Admins,
}

#[derive(clap::Subcommand)]
pub enum RegistryCommand {
    /// Show entries, given by label (e.g. `fee.collector`) or raw hash.
    List { ids: Vec<String> },
    /// Set an entry. Requires the admin role.
    Set {
        id: String,
        #[clap(value_enum)]
        value_type: ValueType,
        value: String,
        /// Permission required for later changes, as role name or hash.
        /// Existing entries keep theirs by default.
        #[clap(long)]
        permission: Option<String>,
    },
}

impl AdminScanArguments {
    pub fn config(&self) -> ScanConfig {
        ScanConfig {
            window: self.admin_scan_window,
            initial_step: self.admin_scan_initial_step,
            request_interval: self.admin_scan_request_interval,
            max_requests: self.admin_scan_max_requests,
            max_consecutive_failures: self.admin_scan_max_consecutive_failures,
            block_retries: self.admin_scan_block_retries,
            backoff: Backoff {
                initial: self.admin_scan_initial_backoff,
                max: self.admin_scan_max_backoff,
            },
        }
    }
}

impl Arguments {
    pub fn addresses(&self) -> ContractAddresses {
        ContractAddresses {
            quote_token: self.quote_token_address,
            base_token: self.base_token_address,
            treasury: self.treasury_address,
            pool: self.pool_address,
            state_manager: self.state_manager_address,
        }
    }
}

impl Display for Arguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            logging,
            admin_scan,
            node_url,
            quote_token_address,
            base_token_address,
            treasury_address,
            pool_address,
            state_manager_address,
            private_key,
            command: _,
        } = self;

        write!(f, "{logging}")?;
        write!(f, "{admin_scan}")?;
        writeln!(f, "node_url: {node_url}")?;
        display_option(f, "quote_token_address", quote_token_address)?;
        display_option(f, "base_token_address", base_token_address)?;
        display_option(f, "treasury_address", treasury_address)?;
        display_option(f, "pool_address", pool_address)?;
        display_option(f, "state_manager_address", state_manager_address)?;
        display_secret_option(f, "private_key", private_key)?;
        Ok(())
    }
}

impl Display for LoggingArguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            log_filter,
            log_stderr_threshold,
            use_json_logs,
        } = self;

        writeln!(f, "log_filter: {log_filter}")?;
        writeln!(f, "log_stderr_threshold: {log_stderr_threshold}")?;
        writeln!(f, "use_json_logs: {use_json_logs}")?;
        Ok(())
    }
}

impl Display for AdminScanArguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            admin_scan_window,
            admin_scan_initial_step,
            admin_scan_request_interval,
            admin_scan_max_requests,
            admin_scan_max_consecutive_failures,
            admin_scan_block_retries,
            admin_scan_initial_backoff,
            admin_scan_max_backoff,
        } = self;

        writeln!(f, "admin_scan_window: {admin_scan_window}")?;
        writeln!(f, "admin_scan_initial_step: {admin_scan_initial_step}")?;
        writeln!(
            f,
            "admin_scan_request_interval: {admin_scan_request_interval:?}"
        )?;
        writeln!(f, "admin_scan_max_requests: {admin_scan_max_requests}")?;
        writeln!(
            f,
            "admin_scan_max_consecutive_failures: {admin_scan_max_consecutive_failures}"
        )?;
        writeln!(f, "admin_scan_block_retries: {admin_scan_block_retries}")?;
        writeln!(f, "admin_scan_initial_backoff: {admin_scan_initial_backoff:?}")?;
        writeln!(f, "admin_scan_max_backoff: {admin_scan_max_backoff:?}")?;
        Ok(())
    }
}

fn display_secret_option<T>(f: &mut Formatter<'_>, name: &str, option: &Option<T>) -> fmt::Result {
    display_option(f, name, &option.as_ref().map(|_| "SECRET"))
}

fn display_option(f: &mut Formatter<'_>, name: &str, option: &Option<impl Display>) -> fmt::Result {
    write!(f, "{name}: ")?;
    match option {
        Some(display) => writeln!(f, "{display}"),
        None => writeln!(f, "None"),
    }
}
