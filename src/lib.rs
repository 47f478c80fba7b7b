//! SecondSwap Proxy Library
//!
//! Caching HTTP proxy in front of Dune analytics and CoinGecko. The binary
//! wires these modules together; they are public for integration tests.

pub mod cache;
pub mod cli;
pub mod data;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;
