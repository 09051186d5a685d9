use std::fmt;
use std::str::FromStr;

use ethers_core::types::{Address, H256};
use ethers_core::utils::keccak256;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

pub type EVMAddress = Address;
pub type Hash = H256;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("{0} is not a 0x-prefixed hex string")]
    InvalidHex(String),
    #[error("expected {expected} bytes but got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], Error> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| Error::InvalidHex(s.to_string()))?;
    let bytes = hex::decode(digits).map_err(|_| Error::InvalidHex(s.to_string()))?;

    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| Error::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}

/// Four byte function selector, the leading bytes of every ABI call payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, SerializeDisplay, DeserializeFromStr)]
pub struct Selector([u8; 4]);

impl Selector {
    pub const LEN: usize = 4;

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for Selector {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_hex(s).map(Self)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Whisper topic. Each topic routes to exactly one registered contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, SerializeDisplay, DeserializeFromStr)]
pub struct Topic([u8; 4]);

impl From<[u8; 4]> for Topic {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_hex(s).map(Self)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Keccak-256 of a contract's deployed bytecode, identical to what `EXTCODEHASH` returns.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, SerializeDisplay, DeserializeFromStr)]
pub struct Fingerprint(H256);

impl Fingerprint {
    pub fn of(code: &[u8]) -> Self {
        Self(H256::from(keccak256(code)))
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_hex::<32>(s).map(|bytes| Self(H256::from(bytes)))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}
