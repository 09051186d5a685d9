use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use error_stack::{bail, Result, ResultExt};
use serde::{Deserialize, Serialize};

use super::price::{PriceConfig, PriceFactorProvider};
use super::Error;
use crate::types::EVMAddress;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: EVMAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceConfig>,
}

pub enum Pricing {
    Native,
    Quoted(Arc<dyn PriceFactorProvider>),
}

/// A token accepted as gas payment. The chain's native currency is registered under the zero
/// address and needs no price factor.
pub struct TokenEntry {
    pub symbol: String,
    pub address: EVMAddress,
    pub pricing: Pricing,
}

impl TokenEntry {
    pub fn native(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            address: EVMAddress::zero(),
            pricing: Pricing::Native,
        }
    }

    pub fn quoted(
        symbol: impl Into<String>,
        address: EVMAddress,
        provider: Arc<dyn PriceFactorProvider>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            address,
            pricing: Pricing::Quoted(provider),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.pricing, Pricing::Native)
    }
}

impl fmt::Debug for TokenEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEntry")
            .field("symbol", &self.symbol)
            .field("address", &self.address)
            .field("native", &self.is_native())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct TokenRegistry {
    by_address: HashMap<EVMAddress, Arc<TokenEntry>>,
    /// Upper-cased, symbols are unique regardless of case.
    symbols: HashSet<String>,
}

impl TokenRegistry {
    pub fn from_configs(configs: &[TokenConfig]) -> Result<Self, Error> {
        configs
            .iter()
            .map(|config| {
                let entry = match (&config.price, config.address.is_zero()) {
                    (_, true) => TokenEntry::native(&config.symbol),
                    (Some(price), false) => TokenEntry::quoted(
                        &config.symbol,
                        config.address,
                        Arc::from(
                            price
                                .build()
                                .change_context(Error::InvalidPrice(config.symbol.clone()))?,
                        ),
                    ),
                    (None, false) => bail!(Error::MissingPrice(config.symbol.clone())),
                };

                Ok(entry)
            })
            .try_fold(TokenRegistry::default(), |mut registry, entry| {
                registry.insert(entry?)?;
                Ok(registry)
            })
    }

    pub fn insert(&mut self, entry: TokenEntry) -> Result<(), Error> {
        let symbol = entry.symbol.to_uppercase();
        if self.by_address.contains_key(&entry.address) || self.symbols.contains(&symbol) {
            bail!(Error::DuplicateToken(entry.symbol));
        }

        self.symbols.insert(symbol);
        self.by_address.insert(entry.address, Arc::new(entry));

        Ok(())
    }

    pub fn get(&self, address: &EVMAddress) -> Option<&TokenEntry> {
        self.by_address.get(address).map(AsRef::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenEntry> {
        self.by_address.values().map(AsRef::as_ref)
    }
}
