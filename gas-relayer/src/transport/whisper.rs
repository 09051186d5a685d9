use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use error_stack::{report, Result, ResultExt};
use ethers_providers::{JsonRpcClient, ProviderError};
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::{select, time};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use valuable::Valuable;

use super::{Error, MessageEnvelope, Reply, Transport};
use crate::json_rpc::Client;
use crate::loggable::LoggableError;
use crate::registry::Registries;
use crate::types::Topic;
use crate::url::Url;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub rpc_url: Url,
    /// Hex encoded private key of the relay's identity. A fresh key pair is generated when unset.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default = "default_min_pow")]
    pub min_pow: f64,
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    #[serde(default = "default_pow_time")]
    pub pow_time: u64,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_min_pow() -> f64 {
    0.002
}

fn default_ttl() -> u64 {
    1000
}

fn default_pow_time() -> u64 {
    1
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_buffer_size() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(rename = "privateKeyID")]
    pub private_key_id: String,
    pub topics: Vec<Topic>,
    pub min_pow: f64,
    #[serde(rename = "allowP2P")]
    pub allow_p2p: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WhisperMessage {
    #[serde(default)]
    pub sig: Option<String>,
    pub topic: Topic,
    pub payload: String,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostMessage {
    pub pub_key: String,
    pub sig: String,
    pub ttl: u64,
    pub pow_target: f64,
    pub pow_time: u64,
    pub topic: Topic,
    pub payload: String,
}

#[automock]
#[async_trait]
pub trait ShhClient {
    async fn new_key_pair(&self) -> Result<String, ProviderError>;
    async fn add_private_key(&self, key: String) -> Result<String, ProviderError>;
    async fn public_key(&self, key_id: String) -> Result<String, ProviderError>;
    async fn new_message_filter(&self, criteria: FilterCriteria) -> Result<String, ProviderError>;
    async fn filter_messages(&self, filter_id: String) -> Result<Vec<WhisperMessage>, ProviderError>;
    async fn delete_message_filter(&self, filter_id: String) -> Result<bool, ProviderError>;
    async fn post(&self, message: PostMessage) -> Result<bool, ProviderError>;
}

#[async_trait]
impl<P> ShhClient for Client<P>
where
    P: JsonRpcClient + Send + Sync + 'static,
{
    async fn new_key_pair(&self) -> Result<String, ProviderError> {
        self.request("shh_newKeyPair", ()).await
    }

    async fn add_private_key(&self, key: String) -> Result<String, ProviderError> {
        self.request("shh_addPrivateKey", [key]).await
    }

    async fn public_key(&self, key_id: String) -> Result<String, ProviderError> {
        self.request("shh_getPublicKey", [key_id]).await
    }

    async fn new_message_filter(&self, criteria: FilterCriteria) -> Result<String, ProviderError> {
        self.request("shh_newMessageFilter", [criteria]).await
    }

    async fn filter_messages(&self, filter_id: String) -> Result<Vec<WhisperMessage>, ProviderError> {
        self.request("shh_getFilterMessages", [filter_id]).await
    }

    async fn delete_message_filter(&self, filter_id: String) -> Result<bool, ProviderError> {
        self.request("shh_deleteMessageFilter", [filter_id]).await
    }

    async fn post(&self, message: PostMessage) -> Result<bool, ProviderError> {
        self.request("shh_post", [message]).await
    }
}

/// Registers the relay's asymmetric key with the node and returns its key id.
pub async fn identity<C>(client: &C, private_key: Option<String>) -> Result<String, Error>
where
    C: ShhClient + Send + Sync,
{
    let key_id = match private_key {
        Some(key) => client.add_private_key(key).await,
        None => client.new_key_pair().await,
    }
    .change_context(Error::Identity)?;

    match client.public_key(key_id.clone()).await {
        Ok(public_key) => info!(%public_key, "whisper identity ready"),
        Err(err) => warn!(
            err = LoggableError::from(&err).as_value(),
            "could not read the relay's public key"
        ),
    }

    Ok(key_id)
}

/// Polls the node for messages on the registered topics and feeds them into a bounded channel.
/// The filter follows the registry: a reload with different topics installs a new filter.
pub struct WhisperListener<C> {
    client: Arc<C>,
    key_id: String,
    min_pow: f64,
    poll_interval: Duration,
    registries: watch::Receiver<Arc<Registries>>,
    tx: mpsc::Sender<MessageEnvelope>,
}

impl<C> WhisperListener<C>
where
    C: ShhClient + Send + Sync,
{
    pub fn new(
        client: Arc<C>,
        key_id: String,
        config: &Config,
        registries: watch::Receiver<Arc<Registries>>,
    ) -> (Self, ReceiverStream<MessageEnvelope>) {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let listener = Self {
            client,
            key_id,
            min_pow: config.min_pow,
            poll_interval: config.poll_interval,
            registries,
            tx,
        };

        (listener, ReceiverStream::new(rx))
    }

    pub async fn run(mut self, token: CancellationToken) -> Result<(), Error> {
        let mut interval = time::interval(self.poll_interval);
        let mut filter: Option<String> = None;

        loop {
            select! {
                _ = interval.tick() => {},
                _ = token.cancelled() => {
                    info!("whisper listener exiting");
                    self.remove_filter(filter).await;

                    return Ok(());
                },
            }

            if self.registries.has_changed().unwrap_or(false) {
                self.registries.mark_unchanged();
                self.remove_filter(filter.take()).await;
            }

            let filter_id = match filter.clone() {
                Some(filter_id) => filter_id,
                None => match self.install_filter().await {
                    Ok(Some(filter_id)) => {
                        filter = Some(filter_id.clone());
                        filter_id
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(
                            err = LoggableError::from(&err).as_value(),
                            "failed to install whisper filter"
                        );
                        continue;
                    }
                },
            };

            match self.client.filter_messages(filter_id).await {
                Ok(messages) => {
                    for envelope in messages.into_iter().filter_map(to_envelope) {
                        if self.tx.send(envelope).await.is_err() {
                            info!("envelope consumer is gone, whisper listener exiting");
                            return Ok(());
                        }
                    }
                }
                // filters expire on the node when they are not polled, so the next tick starts over
                Err(err) => {
                    warn!(
                        err = LoggableError::from(&err).as_value(),
                        "failed to poll whisper filter"
                    );
                    filter = None;
                }
            }
        }
    }

    async fn install_filter(&self) -> Result<Option<String>, Error> {
        let topics = self.registries.borrow().topics();
        if topics.is_empty() {
            debug!("no contracts registered, not listening to any topic");
            return Ok(None);
        }

        let filter_id = self
            .client
            .new_message_filter(FilterCriteria {
                private_key_id: self.key_id.clone(),
                topics: topics.clone(),
                min_pow: self.min_pow,
                allow_p2p: true,
            })
            .await
            .change_context(Error::Filter)?;

        info!(
            %filter_id,
            topics = topics.len(),
            "installed whisper message filter"
        );

        Ok(Some(filter_id))
    }

    async fn remove_filter(&self, filter: Option<String>) {
        let Some(filter_id) = filter else {
            return;
        };

        if let Err(err) = self.client.delete_message_filter(filter_id).await {
            debug!(
                err = LoggableError::from(&err).as_value(),
                "failed to delete whisper filter"
            );
        }
    }
}

fn to_envelope(message: WhisperMessage) -> Option<MessageEnvelope> {
    let Some(sig) = message.sig else {
        warn!(hash = ?message.hash, "dropping anonymous message, it cannot be answered");
        return None;
    };

    let digits = message.payload.trim_start_matches("0x");
    match hex::decode(digits) {
        Ok(payload) => Some(MessageEnvelope {
            sig,
            topic: message.topic,
            payload,
        }),
        Err(err) => {
            warn!(hash = ?message.hash, %err, "dropping message with a malformed payload");
            None
        }
    }
}

/// Posts replies encrypted to the sender's public key and signed with the relay's identity.
pub struct WhisperReplier<C> {
    client: Arc<C>,
    key_id: String,
    ttl: u64,
    pow_target: f64,
    pow_time: u64,
}

impl<C> WhisperReplier<C> {
    pub fn new(client: Arc<C>, key_id: String, config: &Config) -> Self {
        Self {
            client,
            key_id,
            ttl: config.ttl,
            pow_target: config.min_pow,
            pow_time: config.pow_time,
        }
    }
}

#[async_trait]
impl<C> Transport for WhisperReplier<C>
where
    C: ShhClient + Send + Sync,
{
    async fn reply(&self, reply: Reply) -> Result<(), Error> {
        let posted = self
            .client
            .post(PostMessage {
                pub_key: reply.to,
                sig: self.key_id.clone(),
                ttl: self.ttl,
                pow_target: self.pow_target,
                pow_time: self.pow_time,
                topic: reply.topic,
                payload: format!("0x{}", hex::encode(reply.text.as_bytes())),
            })
            .await
            .change_context(Error::Rpc)?;

        if !posted {
            return Err(report!(Error::Rejected));
        }

        Ok(())
    }
}
