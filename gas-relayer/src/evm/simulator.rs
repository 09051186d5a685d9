use async_trait::async_trait;
use error_stack::ResultExt;
use ethers_core::types::{Bytes, TransactionRequest, U256};
use mockall::automock;
use tracing::debug;

use super::error::Error;
use super::json_rpc::EthereumClient;
use crate::types::EVMAddress;

type Result<T> = error_stack::Result<T, Error>;

/// Dry-runs a call and reports the gas it consumed without persisting any state.
#[automock]
#[async_trait]
pub trait Simulator {
    async fn simulate(&self, target: EVMAddress, call_data: Bytes) -> Result<U256>;
}

/// Dry-runs calls on a node at the latest block. `eth_estimateGas` and `eth_call` both execute
/// on a throwaway copy of the current state, so nothing a simulation does is ever written and an
/// abandoned simulation leaves nothing behind.
pub struct ChainSimulator<C> {
    client: C,
    account: EVMAddress,
}

impl<C> ChainSimulator<C>
where
    C: EthereumClient + Send + Sync,
{
    /// `account` is the sender the call is simulated from, normally the account that will
    /// submit it.
    pub fn new(client: C, account: EVMAddress) -> Self {
        Self { client, account }
    }
}

#[async_trait]
impl<C> Simulator for ChainSimulator<C>
where
    C: EthereumClient + Send + Sync,
{
    async fn simulate(&self, target: EVMAddress, call_data: Bytes) -> Result<U256> {
        let tx = TransactionRequest::new()
            .from(self.account)
            .to(target)
            .value(U256::zero())
            .data(call_data);

        let gas = self
            .client
            .estimate_gas(tx.clone())
            .await
            .change_context(Error::Estimation)?;

        // estimation alone can succeed for calls that revert once given the estimated gas
        self.client
            .call(tx.gas(gas))
            .await
            .change_context(Error::Reverted)?;

        debug!(%gas, "simulated call");

        Ok(gas)
    }
}
