//! Token amount conversions between on-chain integers and the decimal
//! strings users type and read.
pub mod units;
