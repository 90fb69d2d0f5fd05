//! Renders the browser interface: the contract records are embedded in the
//! script template, the script in the page template.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

use crate::error::InterfaceError;
use crate::ethereum::abi::ContractRecord;

const PAGE_TEMPLATE: &str = include_str!("../templates/index.html");
const SCRIPT_TEMPLATE: &str = include_str!("../templates/main-script.js");

const CONTRACTS_PLACEHOLDER: &str = "<% contract-details-json %>";
const SCRIPT_PLACEHOLDER: &str = "<% main-script %>";

pub const INDEX_FILE: &str = "index.html";

/// Builds the complete `index.html` content.
pub fn render_page(records: &[ContractRecord], minify: bool) -> Result<String, InterfaceError> {
    // `<` only occurs inside JSON strings; as `\u003c` no ABI text can close
    // or re-open the inline script.
    let contracts = serde_json::to_string_pretty(records)?.replace('<', "\\u003c");

    let mut script = SCRIPT_TEMPLATE.replace(CONTRACTS_PLACEHOLDER, &contracts);
    if minify {
        script = minify_script(&script);
    }

    Ok(PAGE_TEMPLATE.replace(SCRIPT_PLACEHOLDER, &script))
}

/// Drops blank lines, whole-line `//` comments and indentation. Nothing
/// inside a line is touched, so string contents survive.
pub fn minify_script(script: &str) -> String {
    script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Writes `index.html` into an existing `target` directory.
pub fn export(
    records: &[ContractRecord],
    target: &Path,
    minify: bool,
) -> Result<PathBuf, InterfaceError> {
    if !target.is_dir() {
        return Err(InterfaceError::TargetNotFound(target.to_path_buf()));
    }

    let page = render_page(records, minify)?;
    let path = target.join(INDEX_FILE);
    fs::write(&path, page).map_err(|source| InterfaceError::Write {
        path: path.clone(),
        source,
    })?;

    info!("Exported successfully to the folder {:?}", target);
    Ok(path)
}

/// Renders into a fresh temporary directory. The directory is removed when
/// the returned handle is dropped.
pub fn build_to_temp_dir(records: &[ContractRecord]) -> Result<TempDir, InterfaceError> {
    let dir = tempfile::Builder::new()
        .prefix("eth_ui_gen_")
        .tempdir()
        .map_err(|source| InterfaceError::Write {
            path: std::env::temp_dir(),
            source,
        })?;

    export(records, dir.path(), false)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::abi::load_contracts;
    use serde_json::json;

    fn records() -> Vec<ContractRecord> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Token.json"),
            json!({
                "contractName": "Token",
                "abi": [{
                    "type": "function", "name": "note", "stateMutability": "view",
                    "inputs": [
                        { "name": "tag</script>", "type": "string" },
                        { "name": "<!--<script", "type": "string" }
                    ], "outputs": []
                }],
                "networks": { "5777": { "address": "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e" } },
                "bytecode": "0x6080"
            })
            .to_string(),
        )
        .unwrap();
        load_contracts(dir.path()).unwrap()
    }

    #[test]
    fn test_render_embeds_records() {
        let page = render_page(&records(), false).unwrap();

        assert!(!page.contains(CONTRACTS_PLACEHOLDER));
        assert!(!page.contains(SCRIPT_PLACEHOLDER));
        assert!(page.contains("\"contractName\": \"Token\""));
        assert!(page.contains("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));
        assert!(!page.contains("0x6080"));
        assert!(page.contains("tag\\u003c/script>"));
        assert!(page.contains("\\u003c!--\\u003cscript"));
        assert!(!page.contains("<!--"));
        assert_eq!(page.matches("</script>").count(), PAGE_TEMPLATE.matches("</script>").count());
    }

    #[test]
    fn test_minify_keeps_code_and_strips_comments() {
        let script = "// header\n\n    const a = 'http://x';  \n  // note\n  call(a);\n";
        assert_eq!(minify_script(script), "const a = 'http://x';\ncall(a);");

        let full = render_page(&records(), false).unwrap();
        let minified = render_page(&records(), true).unwrap();
        assert!(minified.len() < full.len());
        assert!(minified.contains("\"contractName\": \"Token\""));
    }

    #[test]
    fn test_export_requires_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("dist");
        assert!(matches!(
            export(&records(), &missing, false),
            Err(InterfaceError::TargetNotFound(path)) if path == missing
        ));

        let path = export(&records(), dir.path(), true).unwrap();
        assert!(fs::read_to_string(path).unwrap().contains("Token"));
    }

    #[test]
    fn test_build_to_temp_dir() {
        let dir = build_to_temp_dir(&records()).unwrap();
        assert!(dir
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("eth_ui_gen_"));
        assert!(dir.path().join(INDEX_FILE).is_file());
    }
}
