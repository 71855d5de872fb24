//! This crate contains the code that makes the dashboard observable: the
//! initialization logic for logging and a panic hook that reports through
//! the same log pipeline.
pub mod config;
pub mod panic_hook;
pub mod tracing;

pub use config::Config;
