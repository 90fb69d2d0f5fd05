pub mod abi;
pub mod chain;
pub mod classifier;
pub mod dispatcher;
pub mod utils;

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Summary of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub gas_used: u64,
    pub gas_price: String,
    pub block_number: u64,
    pub status: bool,
}

/// Lifecycle of a submitted transaction. `Submitted` comes at most once and
/// is followed by exactly one of `Mined` or `Failed`.
#[derive(Debug)]
pub enum TxEvent {
    Submitted(TxHash),
    Mined(TransactionInfo),
    Failed(DispatchError),
}

impl TxEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxEvent::Submitted(_))
    }
}
