use async_trait::async_trait;
use ethers_core::types::{
    BlockNumber, Bytes, TransactionReceipt, TransactionRequest, H256, U256,
};
use ethers_core::utils::serialize;
use ethers_providers::{JsonRpcClient, ProviderError};
use mockall::automock;

use crate::json_rpc::Client;
use crate::types::EVMAddress;

type Result<T> = error_stack::Result<T, ProviderError>;

#[automock]
#[async_trait]
pub trait EthereumClient {
    async fn balance(&self, address: EVMAddress) -> Result<U256>;
    async fn code(&self, address: EVMAddress) -> Result<Bytes>;
    async fn call(&self, tx: TransactionRequest) -> Result<Bytes>;
    async fn estimate_gas(&self, tx: TransactionRequest) -> Result<U256>;
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256>;
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>>;
}

#[async_trait]
impl<P> EthereumClient for Client<P>
where
    P: JsonRpcClient + Send + Sync + 'static,
{
    async fn balance(&self, address: EVMAddress) -> Result<U256> {
        self.request(
            "eth_getBalance",
            [serialize(&address), serialize(&BlockNumber::Latest)],
        )
        .await
    }

    async fn code(&self, address: EVMAddress) -> Result<Bytes> {
        self.request(
            "eth_getCode",
            [serialize(&address), serialize(&BlockNumber::Latest)],
        )
        .await
    }

    async fn call(&self, tx: TransactionRequest) -> Result<Bytes> {
        self.request("eth_call", [serialize(&tx), serialize(&BlockNumber::Latest)])
            .await
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> Result<U256> {
        self.request(
            "eth_estimateGas",
            [serialize(&tx), serialize(&BlockNumber::Latest)],
        )
        .await
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256> {
        self.request("eth_sendTransaction", [tx]).await
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        self.request("eth_getTransactionReceipt", [hash]).await
    }
}

#[cfg(test)]
mod tests {
    use ethers_core::types::{BlockNumber, Bytes, TransactionRequest, U256};
    use ethers_core::utils::serialize;
    use ethers_providers::MockProvider;

    use super::EthereumClient;
    use crate::json_rpc::Client;
    use crate::types::EVMAddress;

    fn call_request() -> TransactionRequest {
        TransactionRequest::new()
            .from(EVMAddress::repeat_byte(0xee))
            .to(EVMAddress::repeat_byte(0x11))
            .value(U256::zero())
            .data(Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]))
    }

    #[tokio::test]
    async fn gas_estimation_should_run_against_the_latest_block() {
        let provider = MockProvider::new();
        provider.push::<U256, _>(U256::from(42_000)).unwrap();
        let client = Client::new(provider.clone());

        let gas = client.estimate_gas(call_request()).await.unwrap();

        assert_eq!(gas, U256::from(42_000));
        provider
            .assert_request(
                "eth_estimateGas",
                [serialize(&call_request()), serialize(&BlockNumber::Latest)],
            )
            .unwrap();
    }

    #[tokio::test]
    async fn calls_should_run_against_the_latest_block() {
        let provider = MockProvider::new();
        provider.push::<Bytes, _>(Bytes::from(vec![0x01])).unwrap();
        let client = Client::new(provider.clone());

        client.call(call_request()).await.unwrap();

        provider
            .assert_request(
                "eth_call",
                [serialize(&call_request()), serialize(&BlockNumber::Latest)],
            )
            .unwrap();
    }
}
