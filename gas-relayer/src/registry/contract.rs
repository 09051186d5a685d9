use std::collections::{HashMap, HashSet};

use error_stack::{bail, report, Result};
use ethers_core::abi::param_type::Reader;
use ethers_core::abi::ParamType;
use serde::{Deserialize, Serialize};

use super::Error;
use crate::types::{Fingerprint, Selector, Topic};

pub const GAS_TOKEN: &str = "gasToken";
pub const GAS_PRICE: &str = "gasPrice";
pub const GAS_LIMIT: &str = "gasLimit";
pub const TOKEN: &str = "token";
pub const VALUE: &str = "value";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ContractConfig {
    pub topic: Topic,
    pub code_fingerprint: Fingerprint,
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FunctionConfig {
    pub selector: Selector,
    #[serde(default)]
    pub is_token: bool,
    pub params: Vec<ParamConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ParamConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
}

/// Whitelisted function: its ABI parameters in wire order, and whether it moves a token whose
/// balance has to be checked before relaying.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub params: Vec<ParamSpec>,
    pub is_token: bool,
}

impl FunctionSpec {
    pub fn param_types(&self) -> Vec<ParamType> {
        self.params.iter().map(|param| param.kind.clone()).collect()
    }

    fn kind_of(&self, name: &str) -> Option<&ParamType> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .map(|param| &param.kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractEntry {
    pub code_fingerprint: Fingerprint,
    functions: HashMap<Selector, FunctionSpec>,
}

impl ContractEntry {
    pub fn function(&self, selector: &Selector) -> Option<&FunctionSpec> {
        self.functions.get(selector)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractRegistry(HashMap<Topic, ContractEntry>);

impl ContractRegistry {
    pub fn from_configs(configs: &[ContractConfig]) -> Result<Self, Error> {
        let mut entries = HashMap::new();

        for config in configs {
            let entry = ContractEntry {
                code_fingerprint: config.code_fingerprint,
                functions: functions(config)?,
            };

            if entries.insert(config.topic, entry).is_some() {
                bail!(Error::DuplicateTopic(config.topic));
            }
        }

        Ok(Self(entries))
    }

    pub fn get(&self, topic: &Topic) -> Option<&ContractEntry> {
        self.0.get(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn functions(config: &ContractConfig) -> Result<HashMap<Selector, FunctionSpec>, Error> {
    let mut functions = HashMap::new();

    for function in &config.functions {
        let spec = function_spec(function)?;
        validate_fee_params(function.selector, &spec)?;

        if functions.insert(function.selector, spec).is_some() {
            bail!(Error::DuplicateSelector {
                topic: config.topic,
                selector: function.selector,
            });
        }
    }

    Ok(functions)
}

fn function_spec(function: &FunctionConfig) -> Result<FunctionSpec, Error> {
    let mut seen = HashSet::new();
    let mut params = Vec::with_capacity(function.params.len());

    for param in &function.params {
        if !seen.insert(param.name.as_str()) {
            bail!(Error::DuplicateParam {
                selector: function.selector,
                name: param.name.clone(),
            });
        }

        let kind = Reader::read(&param.kind).map_err(|_| {
            report!(Error::InvalidParamType {
                selector: function.selector,
                kind: param.kind.clone(),
            })
        })?;

        params.push(ParamSpec {
            name: param.name.clone(),
            kind,
        });
    }

    Ok(FunctionSpec {
        params,
        is_token: function.is_token,
    })
}

#[derive(Clone, Copy)]
enum FeeParamKind {
    Address,
    Uint,
}

impl FeeParamKind {
    fn accepts(self, kind: &ParamType) -> bool {
        match self {
            FeeParamKind::Address => matches!(kind, ParamType::Address),
            FeeParamKind::Uint => matches!(kind, ParamType::Uint(_)),
        }
    }
}

// every relayed call pays for itself, so the fee parameters have to be part of its signature
fn validate_fee_params(selector: Selector, spec: &FunctionSpec) -> Result<(), Error> {
    let mut required = vec![
        (GAS_TOKEN, FeeParamKind::Address),
        (GAS_PRICE, FeeParamKind::Uint),
        (GAS_LIMIT, FeeParamKind::Uint),
    ];
    if spec.is_token {
        required.extend([(TOKEN, FeeParamKind::Address), (VALUE, FeeParamKind::Uint)]);
    }

    for (name, expected) in required {
        match spec.kind_of(name) {
            None => bail!(Error::MissingParam {
                selector,
                name: name.to_string(),
            }),
            Some(kind) if !expected.accepts(kind) => bail!(Error::WrongParamType {
                selector,
                name: name.to_string(),
            }),
            Some(_) => {}
        }
    }

    Ok(())
}
