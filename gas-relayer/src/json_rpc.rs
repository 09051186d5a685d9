use std::fmt::Debug;

use error_stack::Report;
use ethers_providers::{Http, JsonRpcClient, ProviderError};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::url::Url;

type Result<T> = error_stack::Result<T, ProviderError>;

/// Thin JSON-RPC client shared by the chain, simulation and whisper endpoints.
#[derive(Clone, Debug)]
pub struct Client<P>
where
    P: JsonRpcClient,
{
    provider: P,
}

impl<P> Client<P>
where
    P: JsonRpcClient,
{
    pub fn new(provider: P) -> Self {
        Client { provider }
    }

    pub async fn request<T, R>(&self, method: &str, params: T) -> Result<R>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        self.provider
            .request(method, params)
            .await
            .map_err(Into::into)
            .map_err(|err: ProviderError| Report::new(err).attach_printable(method.to_string()))
    }
}

impl Client<Http> {
    pub fn new_http(url: &Url) -> Self {
        Client::new(Http::new(url.to_standard_url()))
    }
}
