use {
    alloy::primitives::{
        U256,
        utils::{ParseUnits, Unit, format_units, parse_units},
    },
    anyhow::{Context, Result, bail},
};

pub trait EthUnit: std::marker::Sized {
    /// Returns the current wei amount.
    fn wei(self) -> U256;

    /// Returns the current Eth amount as wei (i.e. 1e18 wei).
    fn eth(self) -> U256 {
        self.wei() * Unit::ETHER.wei()
    }
}

impl EthUnit for u64 {
    fn wei(self) -> U256 {
        U256::from(self)
    }
}

impl EthUnit for u128 {
    fn wei(self) -> U256 {
        U256::from(self)
    }
}

/// Checks that `input` is an unsigned decimal number such as `"12"`,
/// `"0.5"` or `".5"`. Needs no token metadata, so it can reject malformed
/// input before anything is fetched.
pub fn check_amount_syntax(input: &str) -> Result<()> {
    let input = input.trim();
    if input.is_empty() {
        bail!("amount is empty");
    }
    let (whole, fraction) = input.split_once('.').unwrap_or((input, ""));
    let is_digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
    if !is_digits(whole) || !is_digits(fraction) || (whole.is_empty() && fraction.is_empty()) {
        bail!("amount {input:?} is not an unsigned decimal number");
    }
    Ok(())
}

/// Parses a user supplied decimal amount (e.g. `"1.25"`) into the token's
/// smallest unit. Rejects negative numbers and more fractional digits than
/// the token has decimals.
pub fn parse_token_amount(input: &str, decimals: u8) -> Result<U256> {
    check_amount_syntax(input)?;
    let input = input.trim();
    let fraction_digits = input.split_once('.').map_or(0, |(_, fraction)| fraction.len());
    if fraction_digits > usize::from(decimals) {
        bail!("amount {input:?} has more than {decimals} fractional digits");
    }
    match parse_units(input, decimals).with_context(|| format!("invalid amount {input:?}"))? {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => bail!("amount {input:?} is negative"),
    }
}

/// Formats an amount in the token's smallest unit as a decimal string without
/// trailing zeros.
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    let formatted = match format_units(amount, decimals) {
        Ok(formatted) => formatted,
        Err(_) => return amount.to_string(),
    };
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => formatted,
    }
}
