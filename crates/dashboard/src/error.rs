use {alloy::primitives::Address, std::fmt};

/// Failure of a single dashboard operation. Every variant is converted into a
/// user visible status by the session; none of them ends the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} is not configured")]
    Configuration(Setting),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("{account} does not hold the admin role")]
    Unauthorized { account: Address },
    #[error("provider error: {0:#}")]
    Provider(#[from] anyhow::Error),
}

/// A piece of configuration an operation can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    QuoteToken,
    BaseToken,
    Pool,
    StateManager,
    Wallet,
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Setting::QuoteToken => "quote token address",
            Setting::BaseToken => "base token address",
            Setting::Pool => "pool address",
            Setting::StateManager => "state manager address",
            Setting::Wallet => "wallet private key",
        };
        f.write_str(name)
    }
}

/// User input that is rejected before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed address {0:?}")]
    Address(String),
    #[error("malformed amount {input:?}: {reason}")]
    Amount { input: String, reason: String },
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("malformed {expected} value {input:?}")]
    Value { expected: String, input: String },
    #[error("entry {id} holds a {stored} value, not {given}")]
    TypeMismatch {
        id: String,
        stored: String,
        given: String,
    },
    #[error("entry {0} is immutable")]
    Immutable(String),
    #[error("no quote available, set an amount first")]
    NoQuote,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
