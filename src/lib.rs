//! Generates a browser interface for compiled Ethereum contracts and
//! dispatches calls and transactions to them.

pub mod config;
pub mod error;
pub mod ethereum;
pub mod interface;
pub mod server;
