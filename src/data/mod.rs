//! Provider clients and the network identifiers they are keyed by
//!
//! This module contains the Dune analytics and CoinGecko clients, the pure
//! helpers that reshape Dune rows, and the closed set of networks the proxy
//! answers for.

pub mod chains;
pub mod coingecko;
pub mod dune;
pub mod extract;

pub use chains::{to_dune_chain, UnknownChainError};
pub use coingecko::{CoinGeckoClient, CoinGeckoError};
pub use dune::{DuneClient, DuneError, PollSettings, QueryIds, QueryParameters, QueryTemplate};
pub use extract::{extract_network_tvl, ExtractError};

use serde::{Deserialize, Serialize};

/// Wildcard accepted wherever a chain-scoped endpoint takes a chain
pub const ALL_CHAINS: &str = "all";

/// Blockchain networks supported by SecondSwap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Ethereum,
    AvalancheCChain,
    Solana,
}

impl Network {
    /// Returns a slice containing all network variants.
    pub fn all() -> &'static [Network] {
        &[Network::Ethereum, Network::AvalancheCChain, Network::Solana]
    }

    /// Identifier used in query strings and in Dune rows
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::AvalancheCChain => "avalanche_c_chain",
            Network::Solana => "solana",
        }
    }

    /// Parses an API identifier into a Network.
    ///
    /// Matching is exact; returns `None` for anything outside the enumeration.
    pub fn parse(s: &str) -> Option<Network> {
        Network::all().iter().copied().find(|network| network.as_str() == s)
    }

    /// Identifiers of every supported network, in declaration order
    pub fn supported() -> Vec<&'static str> {
        Network::all().iter().map(Network::as_str).collect()
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single network, or every network at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSelector {
    All,
    Network(Network),
}

impl ChainSelector {
    pub fn parse(s: &str) -> Option<ChainSelector> {
        if s == ALL_CHAINS {
            return Some(ChainSelector::All);
        }
        Network::parse(s).map(ChainSelector::Network)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainSelector::All => ALL_CHAINS,
            ChainSelector::Network(network) => network.as_str(),
        }
    }

    /// Every accepted chain identifier, networks first, then the wildcard
    pub fn supported() -> Vec<&'static str> {
        let mut chains = Network::supported();
        chains.push(ALL_CHAINS);
        chains
    }
}
