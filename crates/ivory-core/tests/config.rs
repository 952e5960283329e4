use ivory_core::config::{dirs_path, EngineConfig, ResolverKind, SETTINGS_FILE};

#[test]
fn test_default_settings() {
    let config = EngineConfig::default();
    assert_eq!(config.settings.default_conflict_manager, "latest-revision");
    assert_eq!(config.settings.default_latest_strategy, "latest-revision");
    assert!(config.settings.validate);
    assert!(config.resolvers.is_empty());
}

#[test]
fn test_empty_toml_uses_serde_defaults() {
    let config = EngineConfig::from_str("").unwrap();
    assert_eq!(config.settings.max_concurrency, 8);
    assert_eq!(config.settings.download_timeout, 120);
    assert_eq!(config.settings.cache_dir, "~/.ivory/cache");
}

#[test]
fn test_dirs_path_contains_ivory() {
    assert!(dirs_path().ends_with(".ivory"));
}

#[test]
fn test_parse_full_settings() {
    let toml = r#"
[settings]
default-resolver = "main"
default-conflict-manager = "all"
validate = false

[[namespace]]
name = "maven2"
chain-rules = true

[[namespace.rule]]
rename = { organisation = { system = "apache", local = "org.apache" } }

[[namespace.rule]]
[[namespace.rule.fromsystem]]
module = { from = "^commons-(.+)$", to = "apache-$1" }
[[namespace.rule.tosystem]]
module = { from = "^apache-(.+)$", to = "commons-$1" }

[[resolver]]
name = "local"
kind = "filesystem"
root = "/srv/repo"

[[resolver]]
name = "central"
kind = "maven"
url = "https://repo.maven.apache.org/maven2"
namespace = "maven2"
latest = "latest-time"
validate = true

[[resolver]]
name = "main"
kind = "chain"
children = ["local", "central"]

[[module]]
org = "org.apache*"
resolver = "central"
conflict-manager = "strict"
"#;
    let config = EngineConfig::from_str(toml).unwrap();
    assert_eq!(config.settings.default_resolver.as_deref(), Some("main"));
    assert!(!config.settings.validate);
    assert_eq!(config.namespaces.len(), 1);
    assert!(config.namespaces[0].chain_rules);
    assert_eq!(config.namespaces[0].rules.len(), 2);
    assert_eq!(config.namespaces[0].rules[1].fromsystem.len(), 1);
    assert_eq!(config.resolvers.len(), 3);
    let central = config.resolver("central").unwrap();
    assert_eq!(central.kind, ResolverKind::Maven);
    assert_eq!(central.validate, Some(true));
    assert!(central.checksums);
    assert_eq!(config.resolver("local").unwrap().validate, None);
    assert_eq!(config.resolver("main").unwrap().children, vec!["local", "central"]);
    assert_eq!(config.modules[0].name, "*");
    assert_eq!(config.modules[0].conflict_manager.as_deref(), Some("strict"));
}

#[test]
fn test_unknown_resolver_kind_is_rejected() {
    let err = EngineConfig::from_str(
        r#"
[[resolver]]
name = "x"
kind = "ftp"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_discover_anchors_relative_roots() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join(SETTINGS_FILE),
        r#"
[settings]
cache-dir = "cache"

[[resolver]]
name = "local"
kind = "filesystem"
root = "repo"
"#,
    )
    .unwrap();
    let nested = tmp.path().join("sub").join("dir");
    std::fs::create_dir_all(&nested).unwrap();

    let config = EngineConfig::discover(&nested).unwrap();
    let root = config.resolver("local").unwrap().root.clone().unwrap();
    assert_eq!(std::path::PathBuf::from(root), tmp.path().join("repo"));
    assert_eq!(config.cache_dir(), tmp.path().join("cache"));
}
