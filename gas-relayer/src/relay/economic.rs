use std::future::Future;
use std::time::Duration;

use error_stack::Report;
use ethers_core::types::U256;
use tokio::time::timeout;
use tracing::{debug, warn};
use valuable::Valuable;

use super::params::DecodedParams;
use super::rejection::{Rejection, Stage};
use crate::evm::erc20;
use crate::evm::json_rpc::EthereumClient;
use crate::loggable::LoggableError;
use crate::registry::contract::{GAS_LIMIT, GAS_PRICE, GAS_TOKEN, TOKEN, VALUE};
use crate::registry::token::Pricing;
use crate::registry::{FunctionSpec, TokenRegistry};
use crate::types::EVMAddress;

/// Gas terms a request was admitted with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasBudget {
    pub gas_limit: U256,
    pub gas_price: U256,
    /// `gas_limit` converted into native gas units through the gas token's price factor.
    pub submission_gas_limit: U256,
}

/// Checks that the target can pay for the call it asks to relay.
pub struct EconomicGate<'a, C> {
    client: &'a C,
    rpc_timeout: Duration,
}

impl<'a, C> EconomicGate<'a, C>
where
    C: EthereumClient + Send + Sync,
{
    pub fn new(client: &'a C, rpc_timeout: Duration) -> Self {
        Self {
            client,
            rpc_timeout,
        }
    }

    pub async fn check(
        &self,
        target: EVMAddress,
        function: &FunctionSpec,
        params: &DecodedParams,
        tokens: &TokenRegistry,
    ) -> Result<GasBudget, Rejection> {
        let gas_token = params
            .address(GAS_TOKEN)
            .map_err(|_| Rejection::ParameterDecode)?;
        let gas_price = params
            .uint(GAS_PRICE)
            .map_err(|_| Rejection::ParameterDecode)?;
        let gas_limit = params
            .uint(GAS_LIMIT)
            .map_err(|_| Rejection::ParameterDecode)?;

        let token = tokens.get(&gas_token).ok_or(Rejection::UnsupportedToken)?;

        if function.is_token {
            let moved = params.address(TOKEN).map_err(|_| Rejection::ParameterDecode)?;
            let value = params.uint(VALUE).map_err(|_| Rejection::ParameterDecode)?;

            if self.balance(moved, target).await? < value {
                return Err(Rejection::InsufficientTokenBalance);
            }
        }

        let balance = self.balance(gas_token, target).await?;
        let factor = match &token.pricing {
            Pricing::Native => U256::one(),
            Pricing::Quoted(provider) => {
                self.bounded(provider.factor(), Rejection::PriceUnavailable)
                    .await?
            }
        };

        let balance_native = balance
            .checked_div(factor)
            .ok_or(Rejection::PriceUnavailable)?;
        let submission_gas_limit = gas_limit
            .checked_div(factor)
            .ok_or(Rejection::PriceUnavailable)?;

        match gas_price.checked_mul(gas_limit) {
            Some(cost) if balance_native >= cost => {
                debug!(
                    symbol = %token.symbol,
                    %balance_native,
                    %cost,
                    "gas balance covers the declared cost"
                );

                Ok(GasBudget {
                    gas_limit,
                    gas_price,
                    submission_gas_limit,
                })
            }
            _ => Err(Rejection::InsufficientGasBalance),
        }
    }

    async fn balance(&self, token: EVMAddress, holder: EVMAddress) -> Result<U256, Rejection> {
        self.bounded(
            erc20::balance(self.client, token, holder),
            Rejection::EconomicGateUnavailable,
        )
        .await
    }

    async fn bounded<F, T, E>(&self, call: F, on_error: Rejection) -> Result<T, Rejection>
    where
        F: Future<Output = error_stack::Result<T, E>>,
    {
        match timeout(self.rpc_timeout, call).await {
            Err(_) => Err(Rejection::Timeout(Stage::EconomicGate)),
            Ok(Err(err)) => {
                log_failure(&err, &on_error);
                Err(on_error)
            }
            Ok(Ok(value)) => Ok(value),
        }
    }
}

fn log_failure<E>(err: &Report<E>, rejection: &Rejection) {
    warn!(
        err = LoggableError::from(err).as_value(),
        %rejection,
        "economic gate could not complete"
    );
}
