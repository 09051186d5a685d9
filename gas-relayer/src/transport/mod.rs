use async_trait::async_trait;
use error_stack::Result;
use mockall::automock;
use thiserror::Error;

use crate::types::Topic;

pub mod whisper;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("failed to call whisper json-rpc")]
    Rpc,
    #[error("whisper node refused to post the message")]
    Rejected,
    #[error("failed to set up the relay's whisper identity")]
    Identity,
    #[error("failed to install the message filter")]
    Filter,
}

/// Inbound request as received from the encrypted channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEnvelope {
    /// Public key of the sender, the only address a reply can be sent to.
    pub sig: String,
    pub topic: Topic,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub to: String,
    pub topic: Topic,
    pub text: String,
}

impl Reply {
    pub fn to_sender_of(envelope: &MessageEnvelope, text: String) -> Self {
        Self {
            to: envelope.sig.clone(),
            topic: envelope.topic,
            text,
        }
    }
}

#[automock]
#[async_trait]
pub trait Transport {
    async fn reply(&self, reply: Reply) -> Result<(), Error>;
}
