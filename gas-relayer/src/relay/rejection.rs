use std::fmt;

use thiserror::Error;

use crate::types::Hash;

/// Suspending step of the pipeline, named in timeout replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Bytecode,
    Queue,
    EconomicGate,
    Simulation,
    Submission,
    Receipt,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Stage::Bytecode => "verifying contract code",
            Stage::Queue => "waiting for earlier requests to settle",
            Stage::EconomicGate => "verifying balance",
            Stage::Simulation => "simulating transaction",
            Stage::Submission => "submitting transaction",
            Stage::Receipt => "waiting for receipt",
        };

        f.write_str(stage)
    }
}

/// Reasons a request is turned down before anything is submitted.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    #[error("payload is shorter than target and selector")]
    MalformedPayload,
    #[error("target is not a usable address")]
    InvalidAddress,
    #[error("no contract is registered for the topic")]
    UnknownTopic,
    #[error("function is not whitelisted")]
    FunctionNotWhitelisted,
    #[error("target bytecode does not match the registered fingerprint")]
    BytecodeMismatch,
    #[error("chain node is unavailable")]
    ChainUnavailable,
    #[error("parameters do not match the function's ABI")]
    ParameterDecode,
    #[error("gas token is not supported")]
    UnsupportedToken,
    #[error("token balance is below the transferred value")]
    InsufficientTokenBalance,
    #[error("gas token balance does not cover gas price times gas limit")]
    InsufficientGasBalance,
    #[error("price factor is unavailable")]
    PriceUnavailable,
    #[error("balance could not be read")]
    EconomicGateUnavailable,
    #[error("simulation failed")]
    SimulationFailed,
    #[error("declared gas limit is below the estimated gas")]
    GasLimitTooLow,
    #[error("timed out while {0}")]
    Timeout(Stage),
}

/// Reasons a transaction that was handed to the node did not end up mined successfully.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum SubmissionFailure {
    #[error("node rejected the transaction")]
    Rejected,
    #[error("transaction reverted")]
    Reverted(Hash),
    #[error("no receipt before the deadline")]
    NoReceipt(Hash),
    #[error("timed out while {0}")]
    Timeout(Stage),
}

/// Terminal result of one request. Exactly one reply is derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Rejected(Rejection),
    Submitted(Hash),
    Failed(SubmissionFailure),
}

impl Outcome {
    pub fn reply_text(&self) -> String {
        match self {
            Outcome::Rejected(rejection) => rejection.reply_text(),
            Outcome::Submitted(hash) => format!("Transaction mined;0x{hash:x}"),
            Outcome::Failed(_) => "Couldn't mine transaction".to_string(),
        }
    }
}

impl From<Rejection> for Outcome {
    fn from(rejection: Rejection) -> Self {
        Outcome::Rejected(rejection)
    }
}

impl Rejection {
    pub fn reply_text(&self) -> String {
        match self {
            Rejection::MalformedPayload => "Invalid payload".to_string(),
            Rejection::InvalidAddress => "Invalid address".to_string(),
            Rejection::UnknownTopic => "Invalid topic".to_string(),
            Rejection::FunctionNotWhitelisted => "Function not allowed".to_string(),
            Rejection::BytecodeMismatch => "Invalid contract code".to_string(),
            Rejection::ChainUnavailable => "Couldn't verify contract code".to_string(),
            Rejection::ParameterDecode => "Invalid function parameters".to_string(),
            Rejection::UnsupportedToken => "Token not allowed".to_string(),
            Rejection::InsufficientTokenBalance | Rejection::InsufficientGasBalance => {
                "Not enough balance".to_string()
            }
            Rejection::PriceUnavailable => "Token price unavailable".to_string(),
            Rejection::EconomicGateUnavailable => "Couldn't verify balance".to_string(),
            Rejection::SimulationFailed => "Transaction simulation failed".to_string(),
            Rejection::GasLimitTooLow => "Gas limit below estimated gas".to_string(),
            Rejection::Timeout(stage) => format!("Timed out while {stage}"),
        }
    }
}
