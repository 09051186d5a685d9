use error_stack::{Report, ResultExt};
use ethers_core::abi::{decode, encode, ParamType, Token};
use ethers_core::types::{Bytes, TransactionRequest, U256};
use ethers_core::utils::id;

use super::error::Error;
use super::json_rpc::EthereumClient;
use crate::types::EVMAddress;

type Result<T> = error_stack::Result<T, Error>;

pub fn balance_of_call(token: EVMAddress, holder: EVMAddress) -> TransactionRequest {
    let mut data = id("balanceOf(address)").to_vec();
    data.extend(encode(&[Token::Address(holder)]));

    TransactionRequest::new().to(token).data(Bytes::from(data))
}

/// Balance of `holder` in `token`. The zero address stands for the chain's native currency.
pub async fn balance<C>(client: &C, token: EVMAddress, holder: EVMAddress) -> Result<U256>
where
    C: EthereumClient + Send + Sync,
{
    if token.is_zero() {
        return client.balance(holder).await.change_context(Error::JsonRpc);
    }

    let output = client
        .call(balance_of_call(token, holder))
        .await
        .change_context(Error::JsonRpc)
        .attach_printable_lazy(|| format!("token {token:?}"))?;

    match decode(&[ParamType::Uint(256)], &output)
        .change_context(Error::MalformedBalance)?
        .as_slice()
    {
        [Token::Uint(balance)] => Ok(*balance),
        _ => Err(Report::new(Error::MalformedBalance)),
    }
}

#[cfg(test)]
mod tests {
    use ethers_core::abi::{encode, Token};
    use ethers_core::types::{Bytes, NameOrAddress, U256};

    use super::{balance, balance_of_call};
    use crate::evm::error::Error;
    use crate::evm::json_rpc::MockEthereumClient;
    use crate::types::EVMAddress;

    #[test]
    fn balance_of_call_should_encode_selector_and_holder() {
        let token = EVMAddress::random();
        let holder = EVMAddress::random();

        let call = balance_of_call(token, holder);
        let data = call.data.unwrap();

        assert_eq!(call.to, Some(NameOrAddress::Address(token)));
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(&data[4..], encode(&[Token::Address(holder)]).as_slice());
    }

    #[tokio::test]
    async fn native_balance_should_not_call_any_contract() {
        let holder = EVMAddress::random();
        let mut client = MockEthereumClient::new();
        client
            .expect_balance()
            .withf(move |address| *address == holder)
            .returning(|_| Ok(U256::from(42)));
        client.expect_call().never();

        let balance = balance(&client, EVMAddress::zero(), holder).await.unwrap();

        assert_eq!(balance, U256::from(42));
    }

    #[tokio::test]
    async fn token_balance_should_decode_balance_of_output() {
        let mut client = MockEthereumClient::new();
        client
            .expect_call()
            .returning(|_| Ok(Bytes::from(encode(&[Token::Uint(U256::from(1_000))]))));

        let balance = balance(&client, EVMAddress::random(), EVMAddress::random())
            .await
            .unwrap();

        assert_eq!(balance, U256::from(1_000));
    }

    #[tokio::test]
    async fn token_balance_should_fail_on_empty_output() {
        let mut client = MockEthereumClient::new();
        client.expect_call().returning(|_| Ok(Bytes::new()));

        let err = balance(&client, EVMAddress::random(), EVMAddress::random())
            .await
            .unwrap_err();

        assert!(matches!(err.current_context(), Error::MalformedBalance));
    }
}
