//! Engine settings loaded from `ivory.toml`.
//!
//! The settings file declares namespaces, resolvers, per-module routing and
//! conflict manager overrides, and the engine-wide defaults. Everything has a
//! default so an empty file (or no file) yields a working local setup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the project-level settings file.
pub const SETTINGS_FILE: &str = "ivory.toml";

/// Top-level engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub settings: GeneralSettings,

    #[serde(default, rename = "namespace")]
    pub namespaces: Vec<NamespaceConfig>,

    #[serde(default, rename = "resolver")]
    pub resolvers: Vec<ResolverConfig>,

    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleRule>,
}

/// Engine-wide defaults from `[settings]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeneralSettings {
    #[serde(default)]
    pub default_resolver: Option<String>,
    #[serde(default = "default_conflict_manager")]
    pub default_conflict_manager: String,
    #[serde(default = "default_latest_strategy")]
    pub default_latest_strategy: String,
    /// Ambient validation default for resolvers that leave `validate` unset.
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    /// Per-artifact download timeout in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout: u64,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            default_resolver: None,
            default_conflict_manager: default_conflict_manager(),
            default_latest_strategy: default_latest_strategy(),
            validate: true,
            cache_dir: default_cache_dir(),
            max_concurrency: default_concurrency(),
            download_timeout: default_download_timeout(),
        }
    }
}

fn default_conflict_manager() -> String {
    "latest-revision".to_string()
}

fn default_latest_strategy() -> String {
    "latest-revision".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> String {
    "~/.ivory/cache".to_string()
}

fn default_concurrency() -> usize {
    8
}

fn default_download_timeout() -> u64 {
    120
}

/// A named namespace from `[[namespace]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NamespaceConfig {
    pub name: String,
    #[serde(default)]
    pub chain_rules: bool,
    #[serde(default, rename = "rule")]
    pub rules: Vec<NamespaceRuleConfig>,
}

/// One rule of a namespace. `fromsystem`/`tosystem` are lists so that a
/// duplicated declaration reaches the rule builder and is rejected there.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceRuleConfig {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fromsystem: Vec<TransformConfig>,
    #[serde(default)]
    pub tosystem: Vec<TransformConfig>,
    /// Literal renames; expands into an inverse fromsystem/tosystem pair.
    #[serde(default)]
    pub rename: Option<RenameConfig>,
}

/// Regex transforms per identifier field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default, alias = "org")]
    pub organisation: Option<FieldPattern>,
    #[serde(default)]
    pub module: Option<FieldPattern>,
    #[serde(default, alias = "rev")]
    pub revision: Option<FieldPattern>,
    #[serde(default)]
    pub branch: Option<FieldPattern>,
    /// Transforms on extra attribute values, keyed by attribute name.
    #[serde(default)]
    pub attributes: BTreeMap<String, FieldPattern>,
    /// Attribute key renames applied after value transforms.
    #[serde(default)]
    pub rename_attributes: BTreeMap<String, String>,
}

/// `from` is a regex matched against the whole field; `to` is the replacement
/// template (`$1`, `${name}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldPattern {
    pub from: String,
    pub to: String,
}

/// Literal system-side/local-side values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenameConfig {
    #[serde(default, alias = "org")]
    pub organisation: Option<RenamePair>,
    #[serde(default)]
    pub module: Option<RenamePair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePair {
    pub system: String,
    pub local: String,
}

/// Kind of repository backend a resolver talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    Filesystem,
    Maven,
    Chain,
}

/// A named resolver from `[[resolver]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolverConfig {
    pub name: String,
    pub kind: ResolverKind,
    /// Repository root directory (filesystem).
    #[serde(default)]
    pub root: Option<String>,
    /// Descriptor pattern relative to the root (filesystem).
    #[serde(default)]
    pub ivy_pattern: Option<String>,
    /// Artifact pattern relative to the root (filesystem).
    #[serde(default)]
    pub artifact_pattern: Option<String>,
    /// Repository base URL (maven).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub latest: Option<String>,
    /// Unset means "inherit from the engine settings".
    #[serde(default)]
    pub validate: Option<bool>,
    /// Child resolver names (chain).
    #[serde(default)]
    pub children: Vec<String>,
    /// Stop at the first child that knows a module (chain).
    #[serde(default)]
    pub return_first: bool,
    /// Verify checksum sidecars (maven).
    #[serde(default = "default_true")]
    pub checksums: bool,
}

/// Per-module overrides from `[[module]]`; patterns are globs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleRule {
    #[serde(default = "match_all", alias = "org")]
    pub organisation: String,
    #[serde(default = "match_all", alias = "module")]
    pub name: String,
    #[serde(default)]
    pub resolver: Option<String>,
    #[serde(default)]
    pub conflict_manager: Option<String>,
}

fn match_all() -> String {
    "*".to_string()
}

impl EngineConfig {
    /// Parse settings from TOML text.
    pub fn from_str(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            ivory_util::errors::IvoryError::Config {
                message: format!("Failed to parse settings: {e}"),
            }
            .into()
        })
    }

    /// Load settings from a specific file.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ivory_util::errors::IvoryError::Config {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        let mut config = Self::from_str(&content)?;
        if let Some(dir) = path.parent() {
            config.anchor_paths(dir);
        }
        Ok(config)
    }

    /// Find settings for a working directory.
    ///
    /// Looks for `ivory.toml` in `start` and its ancestors, then for
    /// `~/.ivory/settings.toml`; falls back to defaults when neither exists.
    pub fn discover(start: &Path) -> miette::Result<Self> {
        if let Some(dir) = ivory_util::fs::find_ancestor_with(start, SETTINGS_FILE) {
            return Self::from_path(&dir.join(SETTINGS_FILE));
        }
        let global = dirs_path().join("settings.toml");
        if global.is_file() {
            return Self::from_path(&global);
        }
        tracing::debug!("no settings file found, using defaults");
        Ok(Self::default())
    }

    /// Resolver configuration by name.
    pub fn resolver(&self, name: &str) -> Option<&ResolverConfig> {
        self.resolvers.iter().find(|r| r.name == name)
    }

    /// Cache directory with `~` expanded.
    pub fn cache_dir(&self) -> PathBuf {
        expand_home(&self.settings.cache_dir)
    }

    /// Make relative filesystem roots relative to the settings file's directory.
    fn anchor_paths(&mut self, dir: &Path) {
        for resolver in &mut self.resolvers {
            if let Some(ref root) = resolver.root {
                let path = expand_home(root);
                if path.is_relative() {
                    resolver.root = Some(dir.join(path).to_string_lossy().to_string());
                }
            }
        }
        let cache = expand_home(&self.settings.cache_dir);
        if cache.is_relative() {
            self.settings.cache_dir = dir.join(cache).to_string_lossy().to_string();
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
}

/// Returns the path to the Ivory data directory (`~/.ivory/`).
pub fn dirs_path() -> PathBuf {
    home_dir().join(".ivory")
}
