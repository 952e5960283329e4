//! High-level operations behind the CLI commands: resolve, tree, report,
//! list and settings.

pub mod ops_list;
pub mod ops_report;
pub mod ops_resolve;
pub mod ops_settings;
pub mod ops_tree;
pub mod report_xml;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ivory_core::config::EngineConfig;
use ivory_core::descriptor::ModuleDescriptor;
use ivory_resolver::{ResolveEngine, ResolveOptions};
use ivory_util::errors::{IvoryError, IvoryResult};

/// Module file looked up in the working directory when none is given.
pub const MODULE_FILE: &str = "module.toml";

/// Loaded settings and the engine built from them.
pub struct Session {
    pub config: EngineConfig,
    pub engine: ResolveEngine,
}

impl Session {
    /// Load `settings` if given, otherwise discover them from `cwd`.
    pub fn load(settings: Option<&Path>, cwd: &Path) -> IvoryResult<Self> {
        let config = match settings {
            Some(path) => EngineConfig::from_path(path)?,
            None => EngineConfig::discover(cwd)?,
        };
        Self::from_config(config)
    }

    pub fn from_config(config: EngineConfig) -> IvoryResult<Self> {
        let engine = ivory_repo::build_engine(&config)?;
        Ok(Self { config, engine })
    }

    /// Run options seeded from the settings.
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions::new(self.config.cache_dir())
            .with_max_concurrency(self.config.settings.max_concurrency)
            .with_download_timeout(Duration::from_secs(self.config.settings.download_timeout))
    }
}

/// Read the module to resolve: `path`, or `module.toml` in `cwd`.
pub fn load_module(path: Option<&Path>, cwd: &Path) -> IvoryResult<ModuleDescriptor> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => cwd.join(MODULE_FILE),
    };
    if !path.is_file() {
        return Err(IvoryError::Descriptor {
            message: format!("Could not find {}", path.display()),
        }
        .into());
    }
    ModuleDescriptor::from_path(&path)
}
