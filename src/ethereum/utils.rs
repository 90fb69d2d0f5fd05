use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Checks an address as it appears in a build artifact: 40 hex digits with an
/// optional lowercase `0x` prefix.
pub fn is_hex_address(address: &str) -> bool {
    let digits = address.strip_prefix("0x").unwrap_or(address);
    digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Network ids in artifacts are decimal strings.
pub fn is_network_id(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_digit())
}

/// Parses an address supplied on the command line. The `0x` prefix is optional.
pub fn parse_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    if !is_hex_address(address) {
        return Err(anyhow!(
            "Invalid address: '{}'. Expected 40 hexadecimal characters, optionally prefixed with '0x'",
            address
        ));
    }

    Address::from_str(address)
        .map_err(|e| anyhow!("Invalid Ethereum address: '{}'. Error: {}", address, e))
}

/// Validates network name
pub fn validate_network(network: &str, available_networks: &[String]) -> Result<()> {
    if network.is_empty() {
        return Err(anyhow!("Network name cannot be empty"));
    }

    if !available_networks.iter().any(|n| n == network) {
        return Err(anyhow!(
            "Unknown network: '{}'. Available networks: {}",
            network,
            available_networks.join(", ")
        ));
    }

    Ok(())
}

/// Parses a wei amount given either in decimal or as `0x` hex.
pub fn parse_wei(value_str: &str) -> Result<U256> {
    let value_str = value_str.trim();
    if value_str.is_empty() {
        return Err(anyhow!("Value cannot be empty"));
    }

    if let Some(hex_digits) = value_str
        .strip_prefix("0x")
        .or_else(|| value_str.strip_prefix("0X"))
    {
        U256::from_str_radix(hex_digits, 16)
            .map_err(|_| anyhow!("Invalid hexadecimal value: '{}'", value_str))
    } else {
        U256::from_str_radix(value_str, 10).map_err(|_| {
            anyhow!(
                "Invalid numeric value: '{}'. Use decimal format or '0x' prefixed hex",
                value_str
            )
        })
    }
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        "Call reverted: the contract function rejected the call. Its requirements were not met or an assertion failed.".to_string()
    } else if error.contains("insufficient funds") {
        "Transaction failed: Insufficient funds to cover value and gas. Make sure the sending account holds enough ETH.".to_string()
    } else if error.contains("gas required exceeds allowance") || error.contains("exceeds block gas limit") {
        "Transaction failed: Gas limit out of range. Pass an explicit gas limit for this transaction."
            .to_string()
    } else if error.contains("nonce too low") {
        "Transaction failed: Nonce too low. Another transaction from this account was mined with the same nonce.".to_string()
    } else if error.contains("replacement transaction underpriced") {
        "Transaction failed: Gas price too low to replace a pending transaction. Increase the gas price.".to_string()
    } else if error.contains("unknown account") {
        "Transaction failed: The node does not manage the sending account. Provide a private key to sign locally.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check the node is running and the RPC URL configuration.".to_string()
    } else if error.contains("timeout") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("method not found") {
        "RPC error: The requested method is not supported by this RPC endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hex_address() {
        assert!(is_hex_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));
        assert!(is_hex_address("742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));

        assert!(!is_hex_address(""));
        assert!(!is_hex_address("0x123"));
        assert!(!is_hex_address("0X742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));
        assert!(!is_hex_address("0xgg2d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));
        assert!(!is_hex_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e00"));
    }

    #[test]
    fn test_is_network_id() {
        assert!(is_network_id("1"));
        assert!(is_network_id("5777"));
        assert!(!is_network_id(""));
        assert!(!is_network_id("abc"));
        assert!(!is_network_id("-1"));
        assert!(!is_network_id("1.0"));
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_ok());
        assert!(parse_address("  0000000000000000000000000000000000000000 ").is_ok());
        assert!(parse_address("").is_err());
        assert!(parse_address("not_an_address").is_err());
    }

    #[test]
    fn test_validate_network() {
        let networks = vec!["ganache".to_string(), "sepolia".to_string()];

        assert!(validate_network("ganache", &networks).is_ok());
        assert!(validate_network("invalid", &networks).is_err());
        assert!(validate_network("", &networks).is_err());
    }

    #[test]
    fn test_parse_wei() {
        assert_eq!(parse_wei("1000").unwrap(), U256::from(1000u64));
        assert_eq!(parse_wei("0x10").unwrap(), U256::from(16u64));
        assert!(parse_wei("").is_err());
        assert!(parse_wei("1.5").is_err());
    }

    #[test]
    fn test_interpret_rpc_error() {
        assert!(interpret_rpc_error("execution reverted: nope").starts_with("Call reverted"));
        assert!(interpret_rpc_error("error sending request: connection refused")
            .starts_with("Network error"));
        assert_eq!(interpret_rpc_error("boom"), "RPC error: boom");
    }
}
