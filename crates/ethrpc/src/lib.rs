pub mod alloy;
pub mod block_range;

pub use block_range::BlockRange;

pub type AlloyProvider = ::alloy::providers::DynProvider;
