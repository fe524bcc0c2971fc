//! Metadata type configuration: extension to manifest category mapping plus
//! the few knobs that drive pruning.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::changeset::{ExpansionRules, DEFAULT_SIDECAR_EXTENSIONS, SIDECAR_SUFFIX};
use crate::pruner::DEFAULT_BUNDLE_FOLDERS;

// Embed the default mapping directly in the binary at compile time
const DEFAULT_TYPES_TOML: &str = include_str!("../types.toml");

/// Manifest version used when the configuration does not name one.
pub const FALLBACK_VERSION: &str = "38.0";

/// How one lookup key maps onto the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypeEntry {
    /// Metadata type name, e.g. `ApexClass`.
    pub name: String,
    /// Collapse the member list to `*` as soon as one member is added.
    #[serde(default, alias = "wildCard")]
    pub wildcard: bool,
    /// Child element that names nested members of this type.
    #[serde(default, alias = "unique")]
    pub nested_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeConfig {
    #[serde(default, deserialize_with = "version_string")]
    version: Option<String>,
    #[serde(default)]
    sidecar_extensions: Option<Vec<String>>,
    #[serde(default)]
    bundle_folders: Option<Vec<String>>,
    #[serde(default)]
    types: HashMap<String, TypeEntry>,
}

impl TypeConfig {
    /// The mapping shipped with the binary.
    pub fn builtin() -> Result<Self> {
        toml::from_str(DEFAULT_TYPES_TOML).context("Failed to parse built-in types.toml")
    }

    /// Load a configuration file. `.json` files use the JSON layout, anything
    /// else is read as TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read type config {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
                .with_context(|| format!("Failed to parse type config {}", path.display()))
        } else {
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse type config {}", path.display()))
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Use `path` when given, otherwise the built-in mapping.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Look up a key (extension without the dot, folder key or child element
    /// name). A missing entry means the key is not deployable.
    pub fn get(&self, key: &str) -> Option<&TypeEntry> {
        self.types.get(key.trim_start_matches('.'))
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: TypeEntry) {
        self.types.insert(key.into(), entry);
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or(FALLBACK_VERSION)
    }

    pub fn bundle_folders(&self) -> Vec<String> {
        match &self.bundle_folders {
            Some(folders) => folders.clone(),
            None => DEFAULT_BUNDLE_FOLDERS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn expansion_rules(&self) -> ExpansionRules {
        let sidecar_extensions = match &self.sidecar_extensions {
            Some(exts) => exts
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect(),
            None => DEFAULT_SIDECAR_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        };

        ExpansionRules {
            sidecar_suffix: SIDECAR_SUFFIX.to_string(),
            sidecar_extensions,
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Accept `version = "38.0"` as well as a bare number, which the JSON layout
/// uses.
fn version_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Text(String),
        Number(f64),
    }

    Ok(match Option::<Version>::deserialize(deserializer)? {
        Some(Version::Text(text)) => Some(text),
        Some(Version::Number(number)) if number.fract() == 0.0 => Some(format!("{:.1}", number)),
        Some(Version::Number(number)) => Some(number.to_string()),
        None => None,
    })
}
