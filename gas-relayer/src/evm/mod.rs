pub mod erc20;
pub mod error;
pub mod json_rpc;
pub mod simulator;
