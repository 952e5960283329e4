//! Module identifiers: a module across revisions, and a module at one revision.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a module independent of revision: `(organisation, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    pub organisation: String,
    pub name: String,
}

impl ModuleId {
    pub fn new(organisation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            organisation: organisation.into(),
            name: name.into(),
        }
    }

    /// Attach a revision to this module.
    pub fn at(&self, revision: impl Into<String>) -> ModuleRevisionId {
        ModuleRevisionId {
            module: self.clone(),
            revision: revision.into(),
            branch: None,
            extra: BTreeMap::new(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.organisation, self.name)
    }
}

/// A module at a given revision, with optional branch and extra attributes.
///
/// Equality and hashing include every field, extra attributes too. The derived
/// ordering compares organisation, name, revision, branch, then the extra
/// attributes lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleRevisionId {
    pub module: ModuleId,
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ModuleRevisionId {
    pub fn new(
        organisation: impl Into<String>,
        name: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        ModuleId::new(organisation, name).at(revision)
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Same module, branch and attributes at a different revision.
    pub fn with_revision(&self, revision: impl Into<String>) -> Self {
        Self {
            module: self.module.clone(),
            revision: revision.into(),
            branch: self.branch.clone(),
            extra: self.extra.clone(),
        }
    }

    pub fn organisation(&self) -> &str {
        &self.module.organisation
    }

    pub fn name(&self) -> &str {
        &self.module.name
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module
    }

    /// Parse `org#name;rev`, `org#name#branch;rev` or the Maven form `org:name:rev`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some((head, revision)) = s.split_once(';') {
            let mut parts = head.split('#');
            let organisation = parts.next()?;
            let name = parts.next()?;
            let branch = parts.next();
            if parts.next().is_some() || organisation.is_empty() || name.is_empty() {
                return None;
            }
            let mut mrid = Self::new(organisation, name, revision);
            mrid.branch = branch.filter(|b| !b.is_empty()).map(str::to_string);
            return Some(mrid);
        }

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [org, name, rev] if !org.is_empty() && !name.is_empty() => {
                Some(Self::new(*org, *name, *rev))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ModuleRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.module)?;
        if let Some(ref branch) = self.branch {
            write!(f, "#{branch}")?;
        }
        write!(f, ";{}", self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        let mrid = ModuleRevisionId::new("org.example", "lib", "1.0");
        assert_eq!(mrid.to_string(), "org.example#lib;1.0");
        assert_eq!(mrid.clone().with_branch("trunk").to_string(), "org.example#lib#trunk;1.0");
        assert_eq!(mrid.module_id().to_string(), "org.example#lib");
    }

    #[test]
    fn parse_ivy_and_maven_forms() {
        let a = ModuleRevisionId::parse("org.example#lib;1.0").unwrap();
        let b = ModuleRevisionId::parse("org.example:lib:1.0").unwrap();
        assert_eq!(a, b);

        let branched = ModuleRevisionId::parse("org#lib#dev;2.0").unwrap();
        assert_eq!(branched.branch.as_deref(), Some("dev"));
        assert_eq!(branched.revision, "2.0");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ModuleRevisionId::parse("").is_none());
        assert!(ModuleRevisionId::parse("org:lib").is_none());
        assert!(ModuleRevisionId::parse("#lib;1.0").is_none());
        assert!(ModuleRevisionId::parse("a#b#c#d;1.0").is_none());
    }

    #[test]
    fn extra_attributes_take_part_in_equality() {
        let plain = ModuleRevisionId::new("org", "lib", "1.0");
        let linux = plain.clone().with_extra("platform", "linux");
        let linux_again = plain.clone().with_extra("platform", "linux");
        assert_ne!(plain, linux);
        assert_eq!(linux, linux_again);
    }

    #[test]
    fn extra_attribute_insertion_order_is_irrelevant() {
        let a = ModuleRevisionId::new("org", "lib", "1.0")
            .with_extra("os", "linux")
            .with_extra("arch", "x64");
        let b = ModuleRevisionId::new("org", "lib", "1.0")
            .with_extra("arch", "x64")
            .with_extra("os", "linux");
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_org_name_revision_branch_extra() {
        let mut ids = vec![
            ModuleRevisionId::new("b", "a", "1.0"),
            ModuleRevisionId::new("a", "b", "1.0"),
            ModuleRevisionId::new("a", "a", "2.0"),
            ModuleRevisionId::new("a", "a", "1.0").with_branch("x"),
            ModuleRevisionId::new("a", "a", "1.0"),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(|m| m.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["a#a;1.0", "a#a#x;1.0", "a#a;2.0", "a#b;1.0", "b#a;1.0"]
        );
    }
}
