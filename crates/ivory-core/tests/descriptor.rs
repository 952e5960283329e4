use ivory_core::descriptor::{ConfMapping, ModuleDescriptor, DEFAULT_CONF};
use ivory_core::id::ModuleRevisionId;

#[test]
fn module_file_from_path() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("module.toml");
    std::fs::write(
        &path,
        r#"
[module]
organisation = "org.example"
name = "lib"
revision = "1.5"
extra = { platform = "linux" }

[[dependency]]
org = "org.example"
name = "util"
rev = "latest.release"
attributes = { flavor = "slim" }
extra = { reason = "logging" }
"#,
    )
    .unwrap();

    let md = ModuleDescriptor::from_path(&path).unwrap();
    assert_eq!(md.id.extra.get("platform").map(String::as_str), Some("linux"));
    assert_eq!(md.extra.get("platform").map(String::as_str), Some("linux"));
    assert_eq!(md.configuration_names(), vec![DEFAULT_CONF]);
    assert_eq!(md.status, "integration");

    let dd = &md.dependencies[0];
    assert_eq!(dd.asked.extra.get("flavor").map(String::as_str), Some("slim"));
    assert_eq!(dd.extra.get("reason").map(String::as_str), Some("logging"));
    assert_eq!(dd.mapping, ConfMapping::all());
    assert!(dd.transitive);

    let deps = md.dependencies_for(DEFAULT_CONF);
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].1, vec![DEFAULT_CONF]);
    assert_eq!(deps[0].2, vec!["*"]);
}

#[test]
fn module_file_missing_is_descriptor_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = ModuleDescriptor::from_path(&tmp.path().join("missing.toml")).unwrap_err();
    assert!(err.to_string().starts_with("Descriptor error"));
}

#[test]
fn synthesised_descriptor_is_flagged_default() {
    let md = ModuleDescriptor::synthesised(ModuleRevisionId::new("org", "bare", "0.1"));
    assert!(md.default);
    assert!(md.dependencies.is_empty());
    assert_eq!(md.artifacts_for(DEFAULT_CONF).len(), 1);
}

#[test]
fn conf_mapping_display() {
    let m = ConfMapping::parse("compile->default;test->test");
    assert_eq!(m.to_string(), "compile->default;test->test");
}
