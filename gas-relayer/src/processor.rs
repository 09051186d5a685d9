use std::sync::Arc;

use async_trait::async_trait;
use error_stack::{Result, ResultExt};
use futures::StreamExt;
use mockall::automock;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_stream::Stream;
use tracing::{error, info};

use crate::transport::MessageEnvelope;

#[automock]
#[async_trait]
pub trait EnvelopeHandler {
    async fn handle(&self, envelope: MessageEnvelope);
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("request admission was closed")]
    Admission,
}

/// Hands every envelope from the stream to its own task, with at most `max_in_flight` tasks
/// running at once. Runs until the stream ends, so envelopes the producer buffered before it
/// stopped are still handled, and returns after all started tasks have finished.
pub async fn consume_envelopes<H, S>(
    handler: Arc<H>,
    envelopes: S,
    max_in_flight: usize,
) -> Result<(), Error>
where
    H: EnvelopeHandler + Send + Sync + 'static,
    S: Stream<Item = MessageEnvelope>,
{
    let mut envelopes = Box::pin(envelopes);
    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut tasks = JoinSet::new();

    loop {
        while let Some(result) = tasks.try_join_next() {
            log_task_result(result);
        }

        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .change_context(Error::Admission)?;

        let Some(envelope) = envelopes.next().await else {
            info!("envelope stream closed");
            break;
        };

        let handler = handler.clone();
        tasks.spawn(async move {
            handler.handle(envelope).await;
            drop(permit);
        });
    }

    info!(in_flight = tasks.len(), "draining in-flight requests");
    while let Some(result) = tasks.join_next().await {
        log_task_result(result);
    }

    Ok(())
}

fn log_task_result(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        error!(%err, "request task did not complete");
    }
}
