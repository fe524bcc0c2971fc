use std::fs;

use metadelta::TypeConfig;
use tempfile::tempdir;

#[test]
fn test_builtin_config_loads() {
    let config = TypeConfig::builtin().expect("built-in types.toml must parse");

    assert!(!config.is_empty());
    assert_eq!(config.version(), "38.0");
    assert_eq!(config.get("cls").unwrap().name, "ApexClass");
    assert_eq!(config.get(".cls").unwrap().name, "ApexClass");
    assert!(config.get("cmp").unwrap().wildcard);
    assert_eq!(config.get("fields").unwrap().nested_key.as_deref(), Some("fullName"));
    assert!(config.get("png").is_none(), "unmapped extensions have no entry");
    assert_eq!(config.bundle_folders(), ["aura"]);

    let rules = config.expansion_rules();
    assert!(rules.sidecar_extensions.iter().any(|e| e == "cls"));
    assert_eq!(rules.sidecar_suffix, "-meta.xml");
}

#[test]
fn test_legacy_json_layout() {
    let json = r#"{
        "version": 41.0,
        "types": {
            "cls": { "name": "ApexClass" },
            "cmp": { "name": "AuraDefinitionBundle", "wildCard": true },
            "fields": { "name": "CustomField", "unique": "fullName" }
        }
    }"#;
    let config = TypeConfig::from_json_str(json).unwrap();

    assert_eq!(config.version(), "41.0");
    assert_eq!(config.len(), 3);
    assert!(config.get("cmp").unwrap().wildcard);
    assert_eq!(config.get("fields").unwrap().nested_key.as_deref(), Some("fullName"));
}

#[test]
fn test_toml_overrides() {
    let toml = r#"
        sidecar_extensions = [".flow"]
        bundle_folders = ["aura", "lwc"]

        [types.flow]
        name = "Flow"
    "#;
    let config = TypeConfig::from_toml_str(toml).unwrap();

    assert_eq!(config.version(), "38.0");
    assert_eq!(config.bundle_folders(), ["aura", "lwc"]);
    assert_eq!(config.expansion_rules().sidecar_extensions, ["flow"]);
}

#[test]
fn test_load_from_file() {
    let dir = tempdir().unwrap();

    let json_path = dir.path().join("config.json");
    fs::write(&json_path, r#"{"types": {"page": {"name": "ApexPage"}}}"#).unwrap();
    let config = TypeConfig::load(Some(&json_path)).unwrap();
    assert_eq!(config.get("page").unwrap().name, "ApexPage");

    let toml_path = dir.path().join("types.toml");
    fs::write(&toml_path, "[types.page]\nname = \"ApexPage\"\nwildcard = true\n").unwrap();
    let config = TypeConfig::load(Some(&toml_path)).unwrap();
    assert!(config.get("page").unwrap().wildcard);

    assert!(TypeConfig::load(None).is_ok());
}

#[test]
fn test_unreadable_config_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(TypeConfig::from_file(&dir.path().join("missing.toml")).is_err());

    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{ not json").unwrap();
    let err = TypeConfig::from_file(&bad).unwrap_err();
    assert!(format!("{err:#}").contains("bad.json"));
}
