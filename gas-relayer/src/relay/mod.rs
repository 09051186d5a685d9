use std::time::Duration;

use async_trait::async_trait;
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::field::{debug, display, Empty};
use tracing::{error, info, info_span, Instrument, Span};
use typed_builder::TypedBuilder;
use valuable::Valuable;

use crate::evm::json_rpc::EthereumClient;
use crate::evm::simulator::Simulator;
use crate::loggable::LoggableError;
use crate::processor::EnvelopeHandler;
use crate::registry::RegistryHandle;
use crate::transport::{MessageEnvelope, Reply, Transport};
use crate::types::EVMAddress;

pub mod decoder;
pub mod economic;
pub mod executor;
pub mod params;
pub mod rejection;
pub mod request_locks;
pub mod validator;

use decoder::{decode, RelayRequest};
use economic::{EconomicGate, GasBudget};
use executor::Executor;
use params::decode_params;
pub use rejection::{Outcome, Rejection, Stage, SubmissionFailure};
use request_locks::KeyedLocks;
use validator::Validator;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    /// Bound on each chain read: bytecode, balances, price factors.
    #[serde(with = "humantime_serde")]
    pub rpc: Duration,
    /// Bound on waiting for earlier requests of the same sender or target to settle.
    #[serde(with = "humantime_serde")]
    pub queue: Duration,
    #[serde(with = "humantime_serde")]
    pub simulation: Duration,
    #[serde(with = "humantime_serde")]
    pub submission: Duration,
    #[serde(with = "humantime_serde")]
    pub receipt: Duration,
    #[serde(with = "humantime_serde")]
    pub reply: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            rpc: Duration::from_secs(10),
            queue: Duration::from_secs(60),
            simulation: Duration::from_secs(30),
            submission: Duration::from_secs(30),
            receipt: Duration::from_secs(300),
            reply: Duration::from_secs(10),
        }
    }
}

/// Drives one request through decoding, authorization, the economic gate, simulation and
/// execution, and sends the single reply the request gets.
#[derive(TypedBuilder)]
pub struct Relay<C, S, T> {
    chain: C,
    simulator: S,
    transport: T,
    registries: RegistryHandle,
    relay_account: EVMAddress,
    #[builder(default)]
    timeouts: Timeouts,
    #[builder(default = Duration::from_secs(1))]
    receipt_poll_interval: Duration,
    #[builder(default)]
    sender_locks: KeyedLocks<String>,
    #[builder(default)]
    target_locks: KeyedLocks<EVMAddress>,
}

impl<C, S, T> Relay<C, S, T>
where
    C: EthereumClient + Send + Sync,
    S: Simulator + Send + Sync,
    T: Transport + Send + Sync,
{
    pub async fn process(&self, envelope: &MessageEnvelope) -> Outcome {
        let span = info_span!(
            "relay_request",
            sender = %envelope.sig,
            topic = %envelope.topic,
            target = Empty,
            selector = Empty,
        );

        async {
            let outcome = self
                .evaluate(envelope)
                .await
                .unwrap_or_else(Outcome::Rejected);

            match &outcome {
                Outcome::Rejected(rejection) => info!(%rejection, "request rejected"),
                Outcome::Submitted(hash) => info!(tx_hash = ?hash, "request relayed"),
                Outcome::Failed(failure) => error!(%failure, "relayed transaction failed"),
            }

            self.reply(envelope, &outcome).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn evaluate(&self, envelope: &MessageEnvelope) -> Result<Outcome, Rejection> {
        let registries = self.registries.snapshot();

        let request = decode(envelope)?;
        Span::current()
            .record("target", debug(&request.target))
            .record("selector", display(&request.selector));

        let entry = Validator::new(&self.chain, self.timeouts.rpc)
            .validate(&request, &envelope.topic, &registries)
            .await?;
        let function = entry
            .function(&request.selector)
            .ok_or(Rejection::FunctionNotWhitelisted)?;
        let params = decode_params(function, &request.params)?;

        // held until the transaction settles, so the same balance cannot pay for two requests
        let _settlement = self.settlement_locks(&envelope.sig, request.target).await?;

        let budget = EconomicGate::new(&self.chain, self.timeouts.rpc)
            .check(request.target, function, &params, &registries.tokens)
            .await?;
        let estimated_gas = self.simulate(&request, &budget).await?;

        Ok(Executor::new(
            &self.chain,
            self.relay_account,
            self.timeouts.submission,
            self.timeouts.receipt,
            self.receipt_poll_interval,
        )
        .execute(&request, &budget, estimated_gas)
        .await)
    }

    /// Locks the sender, then the account whose balance pays. The order is fixed, so two requests
    /// never wait on each other's locks.
    async fn settlement_locks(
        &self,
        sender: &str,
        target: EVMAddress,
    ) -> Result<(OwnedMutexGuard<()>, OwnedMutexGuard<()>), Rejection> {
        let sender = sender.to_string();
        let locks = async {
            let sender = self.sender_locks.lock(&sender).await;
            let target = self.target_locks.lock(&target).await;
            (sender, target)
        };

        timeout(self.timeouts.queue, locks)
            .await
            .map_err(|_| Rejection::Timeout(Stage::Queue))
    }

    async fn simulate(&self, request: &RelayRequest, budget: &GasBudget) -> Result<U256, Rejection> {
        let estimated_gas = match timeout(
            self.timeouts.simulation,
            self.simulator
                .simulate(request.target, request.call_data.clone()),
        )
        .await
        {
            Err(_) => return Err(Rejection::Timeout(Stage::Simulation)),
            Ok(Err(err)) => {
                info!(
                    err = LoggableError::from(&err).as_value(),
                    "simulation failed"
                );
                return Err(Rejection::SimulationFailed);
            }
            Ok(Ok(gas)) => gas,
        };

        if estimated_gas > budget.gas_limit {
            info!(%estimated_gas, gas_limit = %budget.gas_limit, "declared gas limit is too low");
            return Err(Rejection::GasLimitTooLow);
        }

        Ok(estimated_gas)
    }

    async fn reply(&self, envelope: &MessageEnvelope, outcome: &Outcome) {
        let reply = Reply::to_sender_of(envelope, outcome.reply_text());

        match timeout(self.timeouts.reply, self.transport.reply(reply)).await {
            Err(_) => error!("timed out posting the reply"),
            Ok(Err(err)) => error!(
                err = LoggableError::from(&err).as_value(),
                "failed to post the reply"
            ),
            Ok(Ok(())) => {}
        }
    }
}

#[async_trait]
impl<C, S, T> EnvelopeHandler for Relay<C, S, T>
where
    C: EthereumClient + Send + Sync,
    S: Simulator + Send + Sync,
    T: Transport + Send + Sync,
{
    async fn handle(&self, envelope: MessageEnvelope) {
        self.process(&envelope).await;
    }
}
