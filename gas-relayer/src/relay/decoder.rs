use ethers_core::types::Bytes;

use super::rejection::Rejection;
use crate::transport::MessageEnvelope;
use crate::types::{EVMAddress, Selector};

const ADDRESS_LEN: usize = 20;
const HEADER_LEN: usize = ADDRESS_LEN + Selector::LEN;

/// A call the sender asks the relay to pay for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayRequest {
    pub target: EVMAddress,
    pub selector: Selector,
    pub params: Bytes,
    pub call_data: Bytes,
}

/// Splits a payload laid out as `target (20 bytes) ++ selector (4 bytes) ++ abi params`.
pub fn decode(envelope: &MessageEnvelope) -> Result<RelayRequest, Rejection> {
    let payload = envelope.payload.as_slice();
    if payload.len() < HEADER_LEN {
        return Err(Rejection::MalformedPayload);
    }

    let (target, call_data) = payload.split_at(ADDRESS_LEN);
    let (selector, params) = call_data.split_at(Selector::LEN);
    let selector: [u8; 4] = selector
        .try_into()
        .map_err(|_| Rejection::MalformedPayload)?;

    Ok(RelayRequest {
        target: EVMAddress::from_slice(target),
        selector: Selector::from(selector),
        params: Bytes::from(params.to_vec()),
        call_data: Bytes::from(call_data.to_vec()),
    })
}
