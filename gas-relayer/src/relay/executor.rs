use std::time::Duration;

use error_stack::{report, Result, ResultExt};
use ethers_core::types::{TransactionReceipt, TransactionRequest, U256};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info};
use valuable::Valuable;

use super::decoder::RelayRequest;
use super::economic::GasBudget;
use super::rejection::{Outcome, Rejection, Stage, SubmissionFailure};
use crate::asyncutil::future::{with_retry, RetryPolicy};
use crate::evm::json_rpc::EthereumClient;
use crate::loggable::LoggableError;
use crate::types::{EVMAddress, Hash};

#[derive(Error, Debug)]
enum Error {
    #[error("failed to fetch the transaction receipt")]
    Receipt,
    #[error("transaction is not mined yet")]
    Pending,
}

/// Submits admitted calls from the relay account and waits for them to be mined. Nothing is
/// resubmitted: whatever happens after the node accepted the transaction is reported as is.
pub struct Executor<'a, C> {
    client: &'a C,
    relay_account: EVMAddress,
    submission_timeout: Duration,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl<'a, C> Executor<'a, C>
where
    C: EthereumClient + Send + Sync,
{
    pub fn new(
        client: &'a C,
        relay_account: EVMAddress,
        submission_timeout: Duration,
        receipt_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            relay_account,
            submission_timeout,
            receipt_timeout,
            poll_interval,
        }
    }

    pub async fn execute(
        &self,
        request: &RelayRequest,
        budget: &GasBudget,
        estimated_gas: U256,
    ) -> Outcome {
        // a transaction capped below what the call needs would revert at the relay's expense
        if budget.submission_gas_limit < estimated_gas {
            info!(
                submission_gas_limit = %budget.submission_gas_limit,
                %estimated_gas,
                "converted gas limit does not cover the estimated gas"
            );
            return Outcome::Rejected(Rejection::GasLimitTooLow);
        }

        let tx = TransactionRequest::new()
            .from(self.relay_account)
            .to(request.target)
            .value(U256::zero())
            .gas(budget.submission_gas_limit)
            .data(request.call_data.clone());

        let hash = match timeout(self.submission_timeout, self.client.send_transaction(tx)).await
        {
            Err(_) => return Outcome::Failed(SubmissionFailure::Timeout(Stage::Submission)),
            Ok(Err(err)) => {
                error!(
                    err = LoggableError::from(&err).as_value(),
                    "node rejected the relayed transaction"
                );
                return Outcome::Failed(SubmissionFailure::Rejected);
            }
            Ok(Ok(hash)) => hash,
        };

        info!(tx_hash = ?hash, "relayed transaction submitted");

        let receipt = timeout(
            self.receipt_timeout,
            with_retry(
                || self.receipt(hash),
                RetryPolicy::poll_for(self.receipt_timeout, self.poll_interval),
            ),
        )
        .await;

        match receipt {
            Err(_) => Outcome::Failed(SubmissionFailure::Timeout(Stage::Receipt)),
            Ok(Err(err)) => {
                error!(
                    err = LoggableError::from(&err).as_value(),
                    tx_hash = ?hash,
                    "gave up waiting for the relayed transaction"
                );
                Outcome::Failed(SubmissionFailure::NoReceipt(hash))
            }
            Ok(Ok(receipt)) if receipt.status == Some(0u64.into()) => {
                Outcome::Failed(SubmissionFailure::Reverted(hash))
            }
            Ok(Ok(_)) => Outcome::Submitted(hash),
        }
    }

    async fn receipt(&self, hash: Hash) -> Result<TransactionReceipt, Error> {
        self.client
            .transaction_receipt(hash)
            .await
            .change_context(Error::Receipt)?
            .ok_or_else(|| report!(Error::Pending))
    }
}
