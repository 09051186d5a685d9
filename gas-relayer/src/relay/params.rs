use std::collections::HashMap;

use ethers_core::abi::{decode, encode, Token};
use ethers_core::types::U256;
use thiserror::Error;

use super::rejection::Rejection;
use crate::registry::FunctionSpec;
use crate::types::EVMAddress;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("parameter {0} is not part of the function")]
    Missing(String),
    #[error("parameter {name} is not {expected}")]
    WrongType { name: String, expected: &'static str },
}

/// Call parameters by declared name.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedParams(HashMap<String, Token>);

impl DecodedParams {
    pub fn get(&self, name: &str) -> Result<&Token, Error> {
        self.0.get(name).ok_or_else(|| Error::Missing(name.to_string()))
    }

    pub fn address(&self, name: &str) -> Result<EVMAddress, Error> {
        match self.get(name)? {
            Token::Address(address) => Ok(*address),
            _ => Err(Error::WrongType {
                name: name.to_string(),
                expected: "an address",
            }),
        }
    }

    pub fn uint(&self, name: &str) -> Result<U256, Error> {
        match self.get(name)? {
            Token::Uint(value) => Ok(*value),
            _ => Err(Error::WrongType {
                name: name.to_string(),
                expected: "an unsigned integer",
            }),
        }
    }
}

/// ABI-decodes `params` with the function's declared types. The tokens must re-encode to exactly
/// the input, so truncated, padded or otherwise non-canonical encodings are rejected.
pub fn decode_params(function: &FunctionSpec, params: &[u8]) -> Result<DecodedParams, Rejection> {
    let tokens = decode(&function.param_types(), params).map_err(|_| Rejection::ParameterDecode)?;

    if encode(&tokens) != params {
        return Err(Rejection::ParameterDecode);
    }

    Ok(DecodedParams(
        function
            .params
            .iter()
            .map(|param| param.name.clone())
            .zip(tokens)
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use ethers_core::abi::{encode, Token};
    use ethers_core::types::U256;

    use super::{decode_params, Error};
    use crate::registry::contract::tests::{call_function, contract_config};
    use crate::registry::{ContractRegistry, FunctionSpec};
    use crate::relay::rejection::Rejection;
    use crate::types::{EVMAddress, Selector, Topic};

    fn function() -> FunctionSpec {
        ContractRegistry::from_configs(&[contract_config(
            "0x27a78f3e",
            b"identity",
            vec![call_function("0x8f0684ac")],
        )])
        .unwrap()
        .get(&Topic::from_str("0x27a78f3e").unwrap())
        .unwrap()
        .function(&Selector::from_str("0x8f0684ac").unwrap())
        .unwrap()
        .clone()
    }

    fn encoded_call() -> Vec<u8> {
        encode(&[
            Token::Address(EVMAddress::repeat_byte(0x22)),
            Token::Uint(U256::from(7)),
            Token::Bytes(vec![0xca, 0xfe]),
            Token::Uint(U256::from(1)),
            Token::Uint(U256::from(2)),
            Token::Uint(U256::from(50_000)),
            Token::Address(EVMAddress::zero()),
            Token::Bytes(vec![0x01; 65]),
        ])
    }

    #[test]
    fn params_should_be_looked_up_by_name() {
        let params = decode_params(&function(), &encoded_call()).unwrap();

        assert_eq!(params.address("to").unwrap(), EVMAddress::repeat_byte(0x22));
        assert_eq!(params.uint("gasLimit").unwrap(), U256::from(50_000));
        assert_eq!(params.address("gasToken").unwrap(), EVMAddress::zero());
        assert_eq!(
            params.get("data").unwrap(),
            &Token::Bytes(vec![0xca, 0xfe])
        );
    }

    #[test]
    fn unknown_names_and_wrong_types_should_fail() {
        let params = decode_params(&function(), &encoded_call()).unwrap();

        assert_eq!(
            params.uint("gasRefund"),
            Err(Error::Missing("gasRefund".to_string()))
        );
        assert!(matches!(
            params.uint("to"),
            Err(Error::WrongType { .. })
        ));
        assert!(matches!(
            params.address("nonce"),
            Err(Error::WrongType { .. })
        ));
    }

    #[test]
    fn truncated_params_should_be_rejected() {
        let mut encoded = encoded_call();
        encoded.truncate(encoded.len() - 32);

        assert_eq!(
            decode_params(&function(), &encoded),
            Err(Rejection::ParameterDecode)
        );
        assert_eq!(
            decode_params(&function(), &[]),
            Err(Rejection::ParameterDecode)
        );
    }

    #[test]
    fn trailing_bytes_should_be_rejected() {
        let mut encoded = encoded_call();
        encoded.extend([0u8; 32]);

        assert_eq!(
            decode_params(&function(), &encoded),
            Err(Rejection::ParameterDecode)
        );
    }

    #[test]
    fn dirty_address_padding_should_be_rejected() {
        let mut encoded = encoded_call();
        encoded[0] = 0xff;

        assert_eq!(
            decode_params(&function(), &encoded),
            Err(Rejection::ParameterDecode)
        );
    }
}
