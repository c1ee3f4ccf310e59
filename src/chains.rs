//! Chain registry: resolves a chain reference to an RPC endpoint and
//! network id.
//!
//! The registry is loaded once at startup, either from a TOML file
//! (`CHAINS_FILE`) or from built-in defaults, and is immutable afterwards.
//! Sessions store only the chain *reference*; endpoint details are resolved
//! again at verification time so registry updates never require touching
//! persisted sessions.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::ChainError;

/// A resolved chain configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub name: String,
    pub network_id: u64,
    pub rpc_url: String,
}

/// TOML shape for one `[chains.<ref>]` entry.
#[derive(Debug, Deserialize)]
struct ChainEntry {
    name: Option<String>,
    network_id: u64,
    rpc_url: String,
}

#[derive(Debug, Deserialize)]
struct ChainsFile {
    chains: BTreeMap<String, ChainEntry>,
}

/// Registry of known chains, keyed by chain reference.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    chains: BTreeMap<String, ChainConfig>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with built-in defaults: a local devnet and the Sepolia
    /// public testnet endpoint.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(
            "localhost",
            ChainConfig {
                name: "Local devnet".to_string(),
                network_id: 31337,
                rpc_url: "http://127.0.0.1:8545".to_string(),
            },
        );
        registry.insert(
            "sepolia",
            ChainConfig {
                name: "Sepolia".to_string(),
                network_id: 11_155_111,
                rpc_url: "https://rpc.sepolia.org".to_string(),
            },
        );
        registry
    }

    /// Parse a registry from TOML. Every RPC URL is validated up front so a
    /// bad endpoint fails at startup rather than at verification time.
    pub fn from_toml_str(raw: &str) -> Result<Self, ChainError> {
        let parsed: ChainsFile =
            toml::from_str(raw).map_err(|e| ChainError::Load(e.to_string()))?;

        let mut registry = Self::new();
        for (chain_ref, entry) in parsed.chains {
            let url = Url::parse(&entry.rpc_url).map_err(|e| ChainError::InvalidRpcUrl {
                chain_ref: chain_ref.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ChainError::InvalidRpcUrl {
                    chain_ref,
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            let name = entry.name.unwrap_or_else(|| chain_ref.clone());
            registry.insert(
                chain_ref,
                ChainConfig {
                    name,
                    network_id: entry.network_id,
                    rpc_url: entry.rpc_url,
                },
            );
        }
        Ok(registry)
    }

    pub fn from_file(path: &Path) -> Result<Self, ChainError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ChainError::Load(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn insert(&mut self, chain_ref: impl Into<String>, config: ChainConfig) {
        self.chains.insert(chain_ref.into(), config);
    }

    /// Resolve a chain reference to its configuration.
    pub fn resolve(&self, chain_ref: &str) -> Result<ChainConfig, ChainError> {
        self.chains
            .get(chain_ref)
            .cloned()
            .ok_or_else(|| ChainError::Unknown {
                chain_ref: chain_ref.to_string(),
            })
    }

    /// Known chain references, in sorted order.
    pub fn refs(&self) -> impl Iterator<Item = (&str, &ChainConfig)> {
        self.chains.iter().map(|(k, v)| (k.as_str(), v))
    }
}
