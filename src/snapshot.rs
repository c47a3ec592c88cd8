//! Observation snapshots
//!
//! A snapshot is captured resource state, one list per kind:
//!
//! ```json
//! {
//!   "container.cluster": [{"name": "demo", "status": "RUNNING"}],
//!   "container.node_pool": [{"name": "default-pool-1", "status": "RUNNING"}]
//! }
//! ```
//!
//! The same document may be wrapped as `{"resources": {...}}`, which is what
//! the capture scripts emit alongside their metadata.

use anyhow::{Context, Result};
use conformance::MemoryProvider;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Build a provider from snapshot text
pub fn parse(text: &str) -> Result<MemoryProvider> {
    let document: Value = serde_json::from_str(text).context("Snapshot is not valid JSON")?;
    let resources = match document.get("resources") {
        Some(inner) if inner.is_object() => inner,
        _ => &document,
    };
    let provider = MemoryProvider::from_snapshot(resources).context("Malformed snapshot")?;
    log::debug!("Snapshot holds kinds: {}", provider.kinds().collect::<Vec<_>>().join(", "));
    Ok(provider)
}

/// Load a snapshot file
pub fn load(path: &Path) -> Result<MemoryProvider> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    parse(&text).with_context(|| format!("Failed to load snapshot: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conformance::{ObservationProvider, Selector};
    use tempfile::TempDir;

    #[test]
    fn test_plain_snapshot() {
        let provider =
            parse(r#"{"container.cluster": [{"name": "demo", "status": "RUNNING"}]}"#).unwrap();
        let cluster = provider
            .get("container.cluster", &Selector::name("demo"))
            .unwrap();
        assert_eq!(cluster.get("status").unwrap(), "RUNNING");
    }

    #[test]
    fn test_wrapped_snapshot() {
        let provider = parse(
            r#"{"captured_at": "2026-01-01T00:00:00Z", "resources": {"command": [{"name": "kubectl version", "exit_status": 0}]}}"#,
        )
        .unwrap();
        assert!(provider
            .exists("command", &Selector::name("kubectl version"))
            .unwrap());
    }

    #[test]
    fn test_malformed_snapshot() {
        assert!(parse("not json").is_err());
        assert!(parse(r#"{"container.cluster": {"name": "demo"}}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("observed.json");
        fs::write(&path, r#"{"container.cluster": [{"name": "demo"}]}"#).unwrap();
        let provider = load(&path).unwrap();
        assert_eq!(provider.kinds().collect::<Vec<_>>(), ["container.cluster"]);

        let missing = load(&dir.path().join("missing.json")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read snapshot"));
    }
}
