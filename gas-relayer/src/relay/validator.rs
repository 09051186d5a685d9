use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;
use valuable::Valuable;

use super::decoder::RelayRequest;
use super::rejection::{Rejection, Stage};
use crate::evm::json_rpc::EthereumClient;
use crate::loggable::LoggableError;
use crate::registry::{ContractEntry, Registries};
use crate::types::{Fingerprint, Topic};

/// Authorizes a request against the contract registry. The checks run from cheapest to most
/// expensive and only the bytecode check goes to the chain.
pub struct Validator<'a, C> {
    client: &'a C,
    rpc_timeout: Duration,
}

impl<'a, C> Validator<'a, C>
where
    C: EthereumClient + Send + Sync,
{
    pub fn new(client: &'a C, rpc_timeout: Duration) -> Self {
        Self {
            client,
            rpc_timeout,
        }
    }

    pub async fn validate<'r>(
        &self,
        request: &RelayRequest,
        topic: &Topic,
        registries: &'r Registries,
    ) -> Result<&'r ContractEntry, Rejection> {
        if request.target.is_zero() {
            return Err(Rejection::InvalidAddress);
        }

        let entry = registries
            .contracts
            .get(topic)
            .ok_or(Rejection::UnknownTopic)?;

        if entry.function(&request.selector).is_none() {
            return Err(Rejection::FunctionNotWhitelisted);
        }

        let code = match timeout(self.rpc_timeout, self.client.code(request.target)).await {
            Err(_) => return Err(Rejection::Timeout(Stage::Bytecode)),
            Ok(Err(err)) => {
                warn!(
                    err = LoggableError::from(&err).as_value(),
                    target = ?request.target,
                    "failed to fetch target bytecode"
                );
                return Err(Rejection::ChainUnavailable);
            }
            Ok(Ok(code)) => code,
        };

        if Fingerprint::of(&code) != entry.code_fingerprint {
            return Err(Rejection::BytecodeMismatch);
        }

        Ok(entry)
    }
}
