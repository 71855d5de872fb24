//! Typed bindings for the contracts the dashboard talks to. Every on-chain
//! function gets exactly one generated method so argument and return types
//! are checked at compile time.
pub mod alloy;
