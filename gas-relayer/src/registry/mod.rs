use std::sync::Arc;

use error_stack::{Result, ResultExt};
use thiserror::Error;
use tokio::sync::watch;

use crate::types::{Selector, Topic};

pub mod contract;
pub mod price;
pub mod token;

pub use contract::{ContractConfig, ContractEntry, ContractRegistry, FunctionSpec};
pub use token::{TokenConfig, TokenEntry, TokenRegistry};

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("topic {0} is registered more than once")]
    DuplicateTopic(Topic),
    #[error("selector {selector} is registered more than once under topic {topic}")]
    DuplicateSelector { topic: Topic, selector: Selector },
    #[error("function {selector} declares parameter {name} more than once")]
    DuplicateParam { selector: Selector, name: String },
    #[error("function {selector} declares unknown ABI type {kind}")]
    InvalidParamType { selector: Selector, kind: String },
    #[error("function {selector} is missing required parameter {name}")]
    MissingParam { selector: Selector, name: String },
    #[error("parameter {name} of function {selector} has the wrong type")]
    WrongParamType { selector: Selector, name: String },
    #[error("token {0} is registered more than once")]
    DuplicateToken(String),
    #[error("token {0} needs a price factor provider")]
    MissingPrice(String),
    #[error("token {0} has an invalid price factor provider")]
    InvalidPrice(String),
    #[error("failed to load the contract registry")]
    Contracts,
    #[error("failed to load the token registry")]
    Tokens,
}

/// Immutable view of both registries. Every request works against the snapshot that was current
/// when it started.
#[derive(Debug, Default)]
pub struct Registries {
    pub contracts: ContractRegistry,
    pub tokens: TokenRegistry,
}

impl Registries {
    pub fn new(contracts: &[ContractConfig], tokens: &[TokenConfig]) -> Result<Self, Error> {
        Ok(Self {
            contracts: ContractRegistry::from_configs(contracts).change_context(Error::Contracts)?,
            tokens: TokenRegistry::from_configs(tokens).change_context(Error::Tokens)?,
        })
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.contracts.topics().copied().collect()
    }
}

/// Publishes registry snapshots. Reloads replace the whole snapshot, so readers never observe a
/// partially updated registry.
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    tx: Arc<watch::Sender<Arc<Registries>>>,
}

impl RegistryHandle {
    pub fn new(registries: Registries) -> Self {
        let (tx, _) = watch::channel(Arc::new(registries));

        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Arc<Registries> {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, registries: Registries) {
        self.tx.send_replace(Arc::new(registries));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Registries>> {
        self.tx.subscribe()
    }
}
