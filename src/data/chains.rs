//! Static mapping from SecondSwap chain identifiers to Dune chain names
//!
//! Dune names some chains differently from SecondSwap (`avalanche_c` vs
//! `avalanche_c_chain`). Every identifier a chain-scoped endpoint accepts has
//! exactly one entry here.

use thiserror::Error;

use super::ALL_CHAINS;

/// Identifier has no Dune counterpart
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown chain: {0}")]
pub struct UnknownChainError(pub String);

/// SecondSwap identifier → Dune chain name
pub static CHAIN_MAPPING: [(&str, &str); 4] = [
    ("ethereum", "ethereum"),
    ("avalanche_c_chain", "avalanche_c"),
    ("solana", "solana"),
    (ALL_CHAINS, "all"),
];

/// Converts a SecondSwap chain identifier into the name Dune queries expect
///
/// # Arguments
///
/// * `chain` - Network identifier (e.g. "avalanche_c_chain") or "all"
///
/// # Returns
///
/// The Dune chain name (e.g. "avalanche_c"), or `UnknownChainError` if the
/// identifier is not in [`CHAIN_MAPPING`]
pub fn to_dune_chain(chain: &str) -> Result<&'static str, UnknownChainError> {
    CHAIN_MAPPING
        .iter()
        .find(|(id, _)| *id == chain)
        .map(|(_, dune)| *dune)
        .ok_or_else(|| UnknownChainError(chain.to_string()))
}
