use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to call ethereum json-rpc")]
    JsonRpc,
    #[error("balanceOf returned malformed data")]
    MalformedBalance,
    #[error("node could not estimate gas for the call")]
    Estimation,
    #[error("call reverted against the latest chain state")]
    Reverted,
}
