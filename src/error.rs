use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning a directory of build artifacts into contract records.
#[derive(Error, Debug)]
pub enum AbiError {
    #[error("The directory {0:?} does not exist.")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The provided JSON is not valid: {path:?} does not match the compiled contract format")]
    InvalidAbiSchema { path: PathBuf },

    #[error("No ABI found in the folder {0:?}.")]
    NoAbiFound(PathBuf),
}

/// Failures while calling or transacting against a loaded contract.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Contract '{0}' is not loaded")]
    ContractNotLoaded(String),

    #[error("Function '{method}' not found in contract '{contract}'")]
    MethodNotFound { method: String, contract: String },

    #[error("The stateMutability of the smart contract function {method} is not defined.")]
    UndefinedMutability { method: String },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Failed to sign transaction: {0}")]
    Signing(String),

    #[error("{0}")]
    ChainRpc(String),
}

impl DispatchError {
    /// Wraps a transport failure, translating common node messages.
    pub fn rpc(error: impl std::fmt::Display) -> Self {
        DispatchError::ChainRpc(crate::ethereum::utils::interpret_rpc_error(
            &error.to_string(),
        ))
    }
}

#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("The folder {0:?} does not exist.")]
    TargetNotFound(PathBuf),

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize contract details: {0}")]
    Serialize(#[from] serde_json::Error),
}
