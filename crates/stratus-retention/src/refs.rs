//! Pinned (layer, version) references
//!
//! The references file enumerates versions that retention must never
//! delete, in any of three accepted shapes:
//!
//! 1. `{schema_version: 1, layers: {<layer>: [<version>, …]}}`
//! 2. `{<layer>: [<version>, …]}`
//! 3. `{schema_version: 1, references: [{layer: …, version: …}, …]}`

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_yaml::Value;

use crate::error::{Error, Result};

/// Pinned versions per layer.
pub type PinnedReferences = BTreeMap<String, BTreeSet<String>>;

fn string_set(value: &Value) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                out.insert(trimmed.to_string());
            }
        }
        Value::Sequence(items) => {
            for item in items {
                if let Value::String(s) = item {
                    let trimmed = s.trim();
                    if !trimmed.is_empty() {
                        out.insert(trimmed.to_string());
                    }
                }
            }
        }
        _ => {}
    }
    out
}

/// Load pinned references from a YAML/JSON file. A missing file yields an
/// empty set; a present-but-malformed file is an error.
pub fn load_tile_references(path: &Path) -> Result<PinnedReferences> {
    if !path.exists() {
        return Ok(PinnedReferences::new());
    }
    let raw = std::fs::read(path)?;
    let data: Value = serde_yaml::from_slice(&raw)
        .map_err(|e| Error::references(format!("unreadable references file: {e}")))?;
    let Value::Mapping(mapping) = &data else {
        return Err(Error::references("references file must be a mapping"));
    };

    let mut out = PinnedReferences::new();

    let layers = match mapping.get("layers") {
        Some(Value::Mapping(layers)) => Some(layers),
        _ => None,
    };
    let plain = layers.unwrap_or(mapping);
    for (key, value) in plain {
        let Value::String(layer) = key else { continue };
        let layer = layer.trim();
        if layer.is_empty() || layer == "schema_version" || layer == "references" {
            continue;
        }
        let versions = string_set(value);
        if !versions.is_empty() {
            out.entry(layer.to_string()).or_default().extend(versions);
        }
    }

    if let Some(Value::Sequence(refs)) = mapping.get("references") {
        for item in refs {
            let Value::Mapping(entry) = item else { continue };
            let layer = entry.get("layer").and_then(Value::as_str);
            let version = entry.get("version").and_then(Value::as_str);
            if let (Some(layer), Some(version)) = (layer, version) {
                let (layer, version) = (layer.trim(), version.trim());
                if !layer.is_empty() && !version.is_empty() {
                    out.entry(layer.to_string())
                        .or_default()
                        .insert(version.to_string());
                }
            }
        }
    }

    Ok(out)
}

/// Whether a (layer, version) pair is pinned.
pub fn is_pinned(refs: &PinnedReferences, layer: &str, version: &str) -> bool {
    refs.get(layer).is_some_and(|versions| versions.contains(version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(content: &str) -> PinnedReferences {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("references.yaml");
        std::fs::write(&path, content).unwrap();
        load_tile_references(&path).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let refs = load_tile_references(Path::new("/no/such/refs.yaml")).unwrap();
        assert!(refs.is_empty());
    }

    #[test]
    fn test_layers_mapping_format() {
        let refs = load_str(
            "schema_version: 1\nlayers:\n  temperature:\n    - v1\n    - v2\n  wind: v3\n",
        );
        assert!(is_pinned(&refs, "temperature", "v1"));
        assert!(is_pinned(&refs, "temperature", "v2"));
        assert!(is_pinned(&refs, "wind", "v3"));
        assert!(!is_pinned(&refs, "wind", "v4"));
    }

    #[test]
    fn test_plain_mapping_format() {
        let refs = load_str("temperature:\n  - v1\n");
        assert!(is_pinned(&refs, "temperature", "v1"));
    }

    #[test]
    fn test_reference_list_format() {
        let refs = load_str(
            "schema_version: 1\nreferences:\n  - layer: cloud\n    version: v7\n  - layer: cloud\n    version: v8\n",
        );
        assert!(is_pinned(&refs, "cloud", "v7"));
        assert!(is_pinned(&refs, "cloud", "v8"));
    }

    #[test]
    fn test_json_accepted() {
        let refs = load_str(r#"{"layers": {"temperature": ["v1"]}}"#);
        assert!(is_pinned(&refs, "temperature", "v1"));
    }

    #[test]
    fn test_non_mapping_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("references.yaml");
        std::fs::write(&path, "- just\n- a\n- list\n").unwrap();
        assert!(load_tile_references(&path).is_err());
    }

    #[test]
    fn test_blank_entries_dropped() {
        let refs = load_str("temperature:\n  - \"  \"\nwind: []\n");
        assert!(refs.is_empty());
    }
}
