use alloy::json_abi::Function;
use serde_json::Value;

use crate::error::DispatchError;

/// The `stateMutability` of an ABI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Pure,
    View,
    NonPayable,
    Payable,
    Unknown,
}

/// How a call has to be sent to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchClass {
    ReadOnly,
    Transaction { payable: bool },
}

impl Mutability {
    pub fn from_abi_str(value: &str) -> Self {
        match value {
            "pure" => Mutability::Pure,
            "view" => Mutability::View,
            "nonpayable" => Mutability::NonPayable,
            "payable" => Mutability::Payable,
            _ => Mutability::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mutability::Pure => "pure",
            Mutability::View => "view",
            Mutability::NonPayable => "nonpayable",
            Mutability::Payable => "payable",
            Mutability::Unknown => "unknown",
        }
    }

    /// Routes pure/view to `eth_call` and the rest to a transaction. An
    /// unknown mutability is an error rather than a guess.
    pub fn dispatch_class(&self, method: &str) -> Result<DispatchClass, DispatchError> {
        match self {
            Mutability::Pure | Mutability::View => Ok(DispatchClass::ReadOnly),
            Mutability::NonPayable => Ok(DispatchClass::Transaction { payable: false }),
            Mutability::Payable => Ok(DispatchClass::Transaction { payable: true }),
            Mutability::Unknown => Err(DispatchError::UndefinedMutability {
                method: method.to_string(),
            }),
        }
    }
}

/// A `function` entry of a contract ABI, decoded once.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub name: String,
    pub mutability: Mutability,
    /// Typed form used for encoding; `None` when the entry's inputs or outputs
    /// cannot be parsed.
    pub function: Option<Function>,
}

#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    entries: Vec<MethodEntry>,
}

impl MethodTable {
    /// Collects the named `function` entries of an ABI, in ABI order. Anything
    /// that is not an array yields an empty table.
    pub fn from_abi(abi: &Value) -> Self {
        let entries = abi
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.get("type").and_then(Value::as_str) == Some("function"))
                    .filter_map(|item| {
                        let name = item.get("name")?.as_str()?.to_string();
                        let mutability = item
                            .get("stateMutability")
                            .and_then(Value::as_str)
                            .map(Mutability::from_abi_str)
                            .unwrap_or(Mutability::Unknown);
                        let function = serde_json::from_value::<Function>(item.clone()).ok();
                        Some(MethodEntry {
                            name,
                            mutability,
                            function,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { entries }
    }

    /// First entry with this name. Overloads are not told apart by signature.
    pub fn find(&self, name: &str) -> Option<&MethodEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn classify(&self, name: &str) -> Mutability {
        self.find(name)
            .map(|entry| entry.mutability)
            .unwrap_or(Mutability::Unknown)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }
}

pub fn classify(abi: &Value, function_name: &str) -> Mutability {
    MethodTable::from_abi(abi).classify(function_name)
}
