use alloy::primitives::Address;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::AbiError;
use crate::ethereum::classifier::MethodTable;
use crate::ethereum::utils;

/// The part of a compiled contract artifact the interface needs.
#[derive(Debug, Clone, Serialize)]
pub struct ContractRecord {
    /// `None` when the artifact carries a non-string name.
    #[serde(rename = "contractName")]
    pub contract_name: Option<String>,
    pub abi: Value,
    pub networks: Map<String, Value>,
    #[serde(skip)]
    methods: MethodTable,
}

impl ContractRecord {
    /// Builds a record from an artifact that passed [`validate`]. Fields other
    /// than `contractName`, `abi` and `networks` are dropped.
    fn from_validated(mut json: Map<String, Value>) -> Self {
        let contract_name = json
            .remove("contractName")
            .and_then(|name| name.as_str().map(str::to_string));
        let abi = json.remove("abi").unwrap_or(Value::Null);
        let networks = match json.remove("networks") {
            Some(Value::Object(networks)) => networks,
            _ => Map::new(),
        };
        let methods = MethodTable::from_abi(&abi);

        Self {
            contract_name,
            abi,
            networks,
            methods,
        }
    }

    pub fn name(&self) -> &str {
        self.contract_name.as_deref().unwrap_or("default")
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// Deployment address on the given network. Keys are compared as integers,
    /// so `"05777"` matches network 5777.
    pub fn address_on(&self, network_id: u64) -> Option<Address> {
        self.networks
            .iter()
            .find(|(key, _)| key.parse::<u64>().ok() == Some(network_id))
            .and_then(|(_, deployment)| deployment.get("address")?.as_str())
            .and_then(|address| Address::from_str(address).ok())
    }
}

/// Checks that a parsed artifact has the compiled-contract shape.
pub fn validate(json: &Value) -> bool {
    let Some(object) = json.as_object() else {
        return false;
    };

    if !object.contains_key("contractName") || !object.contains_key("abi") {
        return false;
    }

    let Some(networks) = object.get("networks").and_then(Value::as_object) else {
        return false;
    };

    networks.iter().all(|(network_id, deployment)| {
        utils::is_network_id(network_id)
            && deployment
                .get("address")
                .and_then(Value::as_str)
                .is_some_and(utils::is_hex_address)
    })
}

/// Loads every valid artifact in `directory`, sorted by contract name.
///
/// Files that are not JSON are skipped without notice, but a JSON file with
/// the wrong shape fails the whole load.
pub fn load_from_directory(directory: impl AsRef<Path>) -> Result<Vec<ContractRecord>, AbiError> {
    let directory = directory.as_ref();
    if !directory.is_dir() {
        return Err(AbiError::DirectoryNotFound(directory.to_path_buf()));
    }

    let mut records = Vec::new();
    for path in json_files(directory)? {
        let Some(json) = read_json(&path) else {
            continue;
        };

        if !validate(&json) {
            return Err(AbiError::InvalidAbiSchema { path });
        }

        if let Value::Object(object) = json {
            records.push(ContractRecord::from_validated(object));
        }
    }

    records.sort_by(|a, b| compare_names(a.contract_name.as_deref(), b.contract_name.as_deref()));
    info!("Loaded {} contract(s) from {:?}", records.len(), directory);

    Ok(records)
}

/// Like [`load_from_directory`], but an empty result is an error.
pub fn load_contracts(directory: impl AsRef<Path>) -> Result<Vec<ContractRecord>, AbiError> {
    let directory = directory.as_ref();
    let records = load_from_directory(directory)?;

    if records.is_empty() {
        return Err(AbiError::NoAbiFound(directory.to_path_buf()));
    }

    Ok(records)
}

fn json_files(directory: &Path) -> Result<Vec<PathBuf>, AbiError> {
    let io_error = |source| AbiError::Io {
        path: directory.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(directory).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let is_json = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(".json"));

        if is_json && entry.path().is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

fn read_json(path: &Path) -> Option<Value> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Skipping unreadable file {:?}: {}", path, e);
            return None;
        }
    };

    // Invalid UTF-8 becomes U+FFFD; the document is still validated.
    match serde_json::from_str(&String::from_utf8_lossy(&content)) {
        Ok(json) => Some(json),
        Err(e) => {
            debug!("Skipping {:?}, not valid JSON: {}", path, e);
            None
        }
    }
}

fn compare_names(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const ADDRESS: &str = "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e";

    fn artifact(name: &str) -> Value {
        json!({
            "contractName": name,
            "abi": [],
            "networks": { "5777": { "address": ADDRESS } }
        })
    }

    fn write(dir: &Path, file: &str, content: &str) {
        fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn test_validate_accepts_well_formed_artifacts() {
        assert!(validate(&artifact("Token")));
        assert!(validate(&json!({ "contractName": "A", "abi": "anything", "networks": {} })));
        assert!(validate(&json!({
            "contractName": "A",
            "abi": null,
            "networks": {
                "1": { "address": "742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e" },
                "5777": { "address": ADDRESS, "transactionHash": "0x00" }
            }
        })));
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        assert!(!validate(&Value::Null));
        assert!(!validate(&json!([artifact("Token")])));
        assert!(!validate(&json!("Token")));
        assert!(!validate(&json!({ "abi": [], "networks": {} })));
        assert!(!validate(&json!({ "contractName": "A", "networks": {} })));
        assert!(!validate(&json!({ "contractName": "A", "abi": [] })));
        assert!(!validate(&json!({ "contractName": "A", "abi": [], "networks": null })));
        assert!(!validate(&json!({ "contractName": "A", "abi": [], "networks": [] })));
    }

    #[test]
    fn test_validate_rejects_bad_networks() {
        let bad_networks = [
            json!({ "abc": { "address": ADDRESS } }),
            json!({ "1": { "address": "0x123" } }),
            json!({ "1": { "address": 42 } }),
            json!({ "1": {} }),
            json!({ "1": "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e" }),
            json!({ "1": { "address": "0X742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e" } }),
        ];

        for networks in bad_networks {
            let json = json!({ "contractName": "A", "abi": [], "networks": networks });
            assert!(!validate(&json), "accepted {}", json);
            assert!(!validate(&json), "validation must not depend on earlier calls");
        }
    }

    #[test]
    fn test_load_sorts_case_insensitively_and_skips_garbage() {
        let dir = tempdir().unwrap();
        write(dir.path(), "A.json", &artifact("Beta").to_string());
        write(dir.path(), "B.json", &artifact("alpha").to_string());
        write(dir.path(), "C.json", "not json");
        write(dir.path(), "D.txt", &artifact("Ignored").to_string());
        write(dir.path(), "E.JSON", &artifact("AlsoIgnored").to_string());

        let records = load_from_directory(dir.path()).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["alpha", "Beta"]);
    }

    #[test]
    fn test_load_drops_extra_fields() {
        let dir = tempdir().unwrap();
        let mut json = artifact("Token");
        json["bytecode"] = json!("0x6080");
        write(dir.path(), "Token.json", &json.to_string());

        let records = load_from_directory(dir.path()).unwrap();
        let serialized = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(serialized, artifact("Token"));
    }

    #[test]
    fn test_records_without_string_name_sort_last() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "1.json",
            &json!({ "contractName": null, "abi": [], "networks": {} }).to_string(),
        );
        write(dir.path(), "2.json", &artifact("zeta").to_string());
        write(
            dir.path(),
            "3.json",
            &json!({ "contractName": 7, "abi": [1], "networks": {} }).to_string(),
        );

        let records = load_from_directory(dir.path()).unwrap();
        assert_eq!(records[0].contract_name.as_deref(), Some("zeta"));
        assert_eq!(records[1].abi, json!([]));
        assert_eq!(records[2].abi, json!([1]));
    }

    #[test]
    fn test_one_invalid_artifact_aborts_the_load() {
        let dir = tempdir().unwrap();
        write(dir.path(), "Good.json", &artifact("Good").to_string());
        write(
            dir.path(),
            "Bad.json",
            &json!({ "contractName": "Bad", "abi": [], "networks": { "abc": { "address": ADDRESS } } })
                .to_string(),
        );

        let err = load_from_directory(dir.path()).unwrap_err();
        assert!(matches!(err, AbiError::InvalidAbiSchema { path } if path.ends_with("Bad.json")));
    }

    #[test]
    fn test_non_utf8_artifacts_are_still_validated() {
        let dir = tempdir().unwrap();
        write(dir.path(), "Good.json", &artifact("Good").to_string());
        let mut bad = b"{\"contractName\": \"B".to_vec();
        bad.push(0xf6);
        bad.extend_from_slice(b"se\", \"abi\": [], \"networks\": {\"abc\": {\"address\": \"");
        bad.extend_from_slice(ADDRESS.as_bytes());
        bad.extend_from_slice(b"\"}}}");
        fs::write(dir.path().join("Bad.json"), bad).unwrap();

        let err = load_from_directory(dir.path()).unwrap_err();
        assert!(matches!(err, AbiError::InvalidAbiSchema { path } if path.ends_with("Bad.json")));
    }

    #[test]
    fn test_non_utf8_valid_artifact_is_loaded() {
        let dir = tempdir().unwrap();
        let mut content = b"{\"contractName\": \"M".to_vec();
        content.push(0xf6);
        content.extend_from_slice(b"we\", \"abi\": [], \"networks\": {}}");
        fs::write(dir.path().join("Moewe.json"), content).unwrap();

        let records = load_contracts(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "M\u{fffd}we");
    }

    #[test]
    fn test_duplicate_names_are_kept_in_file_order() {
        let dir = tempdir().unwrap();
        let with_marker = |name: &str, marker: u64| {
            json!({ "contractName": name, "abi": [marker], "networks": {} }).to_string()
        };
        write(dir.path(), "Token.json", &with_marker("Token", 1));
        write(dir.path(), "Zed.json", &with_marker("Token", 2));
        write(dir.path(), "token.json", &with_marker("token", 3));
        write(dir.path(), "Alpha.json", &with_marker("alpha", 0));

        let records = load_from_directory(dir.path()).unwrap();
        let markers: Vec<_> = records.iter().map(|r| r.abi.clone()).collect();
        assert_eq!(markers, vec![json!([0]), json!([1]), json!([2]), json!([3])]);
        assert_eq!(records[3].name(), "token");
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("build");
        assert!(matches!(
            load_from_directory(&missing),
            Err(AbiError::DirectoryNotFound(path)) if path == missing
        ));
    }

    #[test]
    fn test_no_json_files_is_no_abi_found() {
        let dir = tempdir().unwrap();
        write(dir.path(), "README.md", "# contracts");

        assert!(load_from_directory(dir.path()).unwrap().is_empty());
        assert!(matches!(load_contracts(dir.path()), Err(AbiError::NoAbiFound(_))));
    }

    #[test]
    fn test_address_on_network() {
        let dir = tempdir().unwrap();
        write(dir.path(), "Token.json", &artifact("Token").to_string());

        let records = load_contracts(dir.path()).unwrap();
        let expected = Address::from_str(ADDRESS).unwrap();
        assert_eq!(records[0].address_on(5777), Some(expected));
        assert_eq!(records[0].address_on(1), None);
    }
}
