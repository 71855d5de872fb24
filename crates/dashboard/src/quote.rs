//! Constant product swap quotes.
//!
//! The pool deducts its fee from the input amount and then trades along the
//! `x * y = k` curve. All arithmetic happens in 256 bits and truncates, the
//! same way the pool contract rounds.

use alloy::primitives::U256;

/// Denominator of basis point values.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Share of the quoted output, in percent, that a swap must at least return.
/// The remaining 2% is the slippage tolerance.
const MIN_OUTPUT_PERCENT: u64 = 98;

/// Pool fee in basis points. Values read from the pool are untrusted and get
/// clamped to 100%.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeeRate(u64);

impl FeeRate {
    pub fn new(bps: u64) -> Self {
        Self(bps.min(BPS_DENOMINATOR))
    }

    /// Converts the raw `feeRate()` return value of the pool.
    pub fn from_onchain(raw: U256) -> Self {
        Self::new(u64::try_from(raw).unwrap_or(u64::MAX))
    }

    pub fn bps(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FeeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Pool balances of the two assets. Always read and replaced together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolReserves {
    pub quote: U256,
    pub base: U256,
}

impl PoolReserves {
    pub fn new(quote: U256, base: U256) -> Self {
        Self { quote, base }
    }

    /// Returns `(reserve_in, reserve_out)` for a trade in `direction`.
    pub fn oriented(&self, direction: SwapDirection) -> (U256, U256) {
        match direction {
            SwapDirection::QuoteToBase => (self.quote, self.base),
            SwapDirection::BaseToQuote => (self.base, self.quote),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SwapDirection {
    /// Sell the quote asset for the base asset.
    #[default]
    QuoteToBase,
    /// Sell the base asset for the quote asset.
    BaseToQuote,
}

impl SwapDirection {
    pub fn toggled(self) -> Self {
        match self {
            SwapDirection::QuoteToBase => SwapDirection::BaseToQuote,
            SwapDirection::BaseToQuote => SwapDirection::QuoteToBase,
        }
    }
}

/// Output of a constant product trade of `amount_in` against the given
/// reserves. Returns zero for zero input, an empty side of the pool, a fee
/// that eats the whole input and for inputs so large that the intermediate
/// products exceed 256 bits.
pub fn estimate_amount_out(
    reserve_in: U256,
    reserve_out: U256,
    fee: FeeRate,
    amount_in: U256,
) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::ZERO;
    }
    checked_amount_out(reserve_in, reserve_out, fee, amount_in).unwrap_or_default()
}

fn checked_amount_out(
    reserve_in: U256,
    reserve_out: U256,
    fee: FeeRate,
    amount_in: U256,
) -> Option<U256> {
    let denominator = U256::from(BPS_DENOMINATOR);
    let amount_in_after_fee = amount_in
        .checked_mul(denominator - U256::from(fee.bps()))?
        .checked_div(denominator)?;
    if amount_in_after_fee.is_zero() {
        return Some(U256::ZERO);
    }
    amount_in_after_fee
        .checked_mul(reserve_out)?
        .checked_div(reserve_in.checked_add(amount_in_after_fee)?)
}

/// The minimum output submitted with a swap: the quoted output minus the
/// slippage tolerance, rounded down.
pub fn min_amount_out(amount_out: U256) -> U256 {
    if amount_out.is_zero() {
        return U256::ZERO;
    }
    // `amount_out` is strictly below a reserve, so multiplying by 98 can only
    // overflow for reserves beyond 2^249.
    amount_out
        .checked_mul(U256::from(MIN_OUTPUT_PERCENT))
        .map(|scaled| scaled / U256::from(100))
        .unwrap_or(amount_out / U256::from(100) * U256::from(MIN_OUTPUT_PERCENT))
}

/// A quote for the current input. Recomputed whenever the input, direction
/// or pool state changes and never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapQuote {
    pub direction: SwapDirection,
    pub amount_in: U256,
    pub amount_out: U256,
    pub min_amount_out: U256,
    reserve_in: U256,
    reserve_out: U256,
}

impl SwapQuote {
    pub fn new(
        reserves: PoolReserves,
        fee: FeeRate,
        direction: SwapDirection,
        amount_in: U256,
    ) -> Self {
        let (reserve_in, reserve_out) = reserves.oriented(direction);
        let amount_out = estimate_amount_out(reserve_in, reserve_out, fee, amount_in);
        Self {
            direction,
            amount_in,
            amount_out,
            min_amount_out: min_amount_out(amount_out),
            reserve_in,
            reserve_out,
        }
    }

    /// How much worse than the spot price `reserve_out / reserve_in` this
    /// trade executes, fee included, in basis points.
    pub fn price_impact_bps(&self) -> u64 {
        let spot_out = self
            .amount_in
            .checked_mul(self.reserve_out)
            .and_then(|product| product.checked_div(self.reserve_in))
            .unwrap_or_default();
        if spot_out.is_zero() || self.amount_out >= spot_out {
            return 0;
        }
        let shortfall = spot_out - self.amount_out;
        shortfall
            .checked_mul(U256::from(BPS_DENOMINATOR))
            .map(|scaled| scaled / spot_out)
            .and_then(|bps| u64::try_from(bps).ok())
            .unwrap_or(BPS_DENOMINATOR)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, number::units::EthUnit};

    fn estimate(reserve_in: u128, reserve_out: u128, fee: u64, amount_in: u128) -> U256 {
        estimate_amount_out(
            U256::from(reserve_in),
            U256::from(reserve_out),
            FeeRate::new(fee),
            U256::from(amount_in),
        )
    }

    #[test]
    fn quotes_with_thirty_bps_fee() {
        // 1000 * 9970 / 10000 = 997 after fee,
        // 997 * 2_000_000 / 1_000_997 = 1992.01..
        let amount_out = estimate(1_000_000, 2_000_000, 30, 1000);
        assert_eq!(amount_out, U256::from(1992));
        assert_eq!(min_amount_out(amount_out), U256::from(1952));
    }

    #[test]
    fn zero_input_or_empty_pool_quotes_nothing() {
        assert_eq!(estimate(1_000_000, 2_000_000, 30, 0), U256::ZERO);
        assert_eq!(estimate(0, 2_000_000, 30, 1000), U256::ZERO);
        assert_eq!(estimate(1_000_000, 0, 30, 1000), U256::ZERO);
        assert_eq!(estimate(0, 0, 0, 0), U256::ZERO);
    }

    #[test]
    fn fee_is_clamped_to_full_input() {
        assert_eq!(FeeRate::new(15_000), FeeRate::new(10_000));
        assert_eq!(FeeRate::from_onchain(U256::MAX).bps(), 10_000);
        assert_eq!(estimate(1_000_000, 2_000_000, 15_000, 1000), U256::ZERO);
        assert_eq!(
            estimate(1_000_000, 2_000_000, 15_000, 1000),
            estimate(1_000_000, 2_000_000, 10_000, 1000)
        );
    }

    #[test]
    fn fee_that_rounds_input_to_zero_quotes_nothing() {
        // 1 * 9970 / 10000 truncates to zero.
        assert_eq!(estimate(1_000_000, 2_000_000, 30, 1), U256::ZERO);
    }

    #[test]
    fn output_is_monotonic_in_input() {
        let reserves = [(1_000_000u128, 2_000_000u128), (200, 50), (1 << 90, 1 << 90)];
        for (reserve_in, reserve_out) in reserves {
            let mut previous = U256::ZERO;
            for amount_in in (0..5_000u128).step_by(7).chain([1 << 80, 1 << 100, 1 << 120]) {
                let amount_out = estimate(reserve_in, reserve_out, 30, amount_in);
                assert!(amount_out >= previous, "{amount_in} decreased the output");
                previous = amount_out;
            }
        }
    }

    #[test]
    fn output_never_drains_the_pool() {
        for amount_in in [1u128, 1_000, 1 << 64, 1 << 126] {
            let amount_out = estimate(1_000, 1_000, 0, amount_in);
            assert!(amount_out < U256::from(1_000));
        }
    }

    #[test]
    fn handles_reserves_beyond_64_bits() {
        // Reserves around 10^30 in the smallest unit.
        let reserve = 1_000_000_000_000u64.eth();
        let amount_out = estimate_amount_out(reserve, reserve, FeeRate::new(0), 1u64.eth());
        assert!(amount_out > U256::ZERO);
        assert!(amount_out < 1u64.eth());
    }

    #[test]
    fn overflowing_products_quote_nothing() {
        assert_eq!(
            estimate_amount_out(U256::MAX, U256::MAX, FeeRate::new(0), U256::MAX),
            U256::ZERO
        );
    }

    #[test]
    fn min_output_keeps_two_percent_tolerance() {
        assert_eq!(min_amount_out(U256::ZERO), U256::ZERO);
        assert_eq!(min_amount_out(U256::from(100)), U256::from(98));
        assert_eq!(min_amount_out(U256::from(1)), U256::ZERO);
        assert!(min_amount_out(U256::MAX) < U256::MAX);
    }

    #[test]
    fn quote_orients_reserves_by_direction() {
        let reserves = PoolReserves::new(U256::from(1_000_000), U256::from(2_000_000));
        let fee = FeeRate::new(30);

        let quote = SwapQuote::new(reserves, fee, SwapDirection::QuoteToBase, U256::from(1000));
        assert_eq!(quote.amount_out, U256::from(1992));
        assert_eq!(quote.min_amount_out, U256::from(1952));

        let quote = SwapQuote::new(reserves, fee, SwapDirection::BaseToQuote, U256::from(1000));
        // 997 * 1_000_000 / 2_000_997
        assert_eq!(quote.amount_out, U256::from(498));
        assert_eq!(SwapDirection::BaseToQuote.toggled(), SwapDirection::QuoteToBase);
    }

    #[test]
    fn price_impact_grows_with_trade_size() {
        let reserves = PoolReserves::new(U256::from(1_000_000), U256::from(1_000_000));
        let quote = |amount: u64| {
            SwapQuote::new(
                reserves,
                FeeRate::new(0),
                SwapDirection::QuoteToBase,
                U256::from(amount),
            )
        };
        assert_eq!(quote(0).price_impact_bps(), 0);
        // 1000 in -> 999 out: 10 bps below spot.
        assert_eq!(quote(1_000).price_impact_bps(), 10);
        // 1_000_000 in -> 500_000 out: half the spot output.
        assert_eq!(quote(1_000_000).price_impact_bps(), 5_000);
    }

    #[test]
    fn fee_rate_display() {
        assert_eq!(FeeRate::new(30).to_string(), "0.30%");
        assert_eq!(FeeRate::new(10_000).to_string(), "100.00%");
    }
}
