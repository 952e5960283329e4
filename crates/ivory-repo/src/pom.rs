//! POM reading and conversion into a module descriptor.
//!
//! Only what a single POM says is used: coordinates, metadata, licenses,
//! properties and dependencies. Parent POMs contribute their coordinates as
//! fallbacks but are not fetched.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use ivory_core::artifact::Artifact;
use ivory_core::descriptor::{
    Configuration, ConfMapping, DependencyDescriptor, License, ModuleDescriptor,
};
use ivory_core::id::ModuleRevisionId;
use ivory_util::errors::{IvoryError, IvoryResult};

#[derive(Debug, Clone, Default)]
pub struct Pom {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub parent: Option<ParentRef>,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<PomDependency>,
    pub licenses: Vec<License>,
}

#[derive(Debug, Clone, Default)]
pub struct ParentRef {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

#[derive(Debug, Clone, Default)]
pub struct PomDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub optional: bool,
    pub classifier: Option<String>,
}

impl Pom {
    pub fn effective_group_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.group_id.as_str()))
    }

    pub fn effective_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.version.as_str()))
    }

    /// Expand `${...}` references from the POM's own properties and
    /// `project.*` values. Unknown references are left as written.
    pub fn interpolate(&self, input: &str) -> String {
        let mut out = String::new();
        let mut rest = input;
        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            out.push_str(&rest[..start]);
            let key = &rest[start + 2..start + len];
            match self.property(key) {
                Some(v) if !v.contains("${") => out.push_str(&v),
                _ => out.push_str(&rest[start..start + len + 1]),
            }
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        out
    }

    fn property(&self, key: &str) -> Option<String> {
        match key {
            "project.groupId" | "pom.groupId" => self.effective_group_id().map(str::to_string),
            "project.artifactId" | "pom.artifactId" => self.artifact_id.clone(),
            "project.version" | "pom.version" => self.effective_version().map(str::to_string),
            "project.parent.version" => self.parent.as_ref().map(|p| p.version.clone()),
            _ => self.properties.get(key).cloned(),
        }
    }

    /// Build the descriptor of `mrid` from this POM.
    ///
    /// Maven scopes become configurations; dependencies without a version
    /// (managed by a parent or BOM) are skipped.
    pub fn to_descriptor(&self, mrid: &ModuleRevisionId) -> ModuleDescriptor {
        let id = ModuleRevisionId {
            module: ivory_core::id::ModuleId::new(
                self.effective_group_id()
                    .map(|g| self.interpolate(g))
                    .unwrap_or_else(|| mrid.organisation().to_string()),
                self.artifact_id
                    .clone()
                    .unwrap_or_else(|| mrid.name().to_string()),
            ),
            revision: self
                .effective_version()
                .map(|v| self.interpolate(v))
                .unwrap_or_else(|| mrid.revision.clone()),
            branch: mrid.branch.clone(),
            extra: mrid.extra.clone(),
        };

        let mut md = ModuleDescriptor::new(id.clone());
        md.status = if id.revision.ends_with("-SNAPSHOT") {
            "integration".to_string()
        } else {
            "release".to_string()
        };
        md.home_page = self.url.clone();
        md.description = self.description.clone().or_else(|| self.name.clone());
        md.licenses = self.licenses.clone();
        md.configurations = maven_configurations();

        for dep in &self.dependencies {
            let Some(ref version) = dep.version else {
                tracing::debug!("{id}: skipping {}:{} without version", dep.group_id, dep.artifact_id);
                continue;
            };
            let asked = ModuleRevisionId::new(
                self.interpolate(&dep.group_id),
                self.interpolate(&dep.artifact_id),
                self.interpolate(version),
            );
            let mut dd = DependencyDescriptor::new(asked);
            dd.mapping = scope_mapping(dep.scope.as_deref(), dep.optional);
            if let Some(ref classifier) = dep.classifier {
                dd.extra.insert("classifier".to_string(), classifier.clone());
            }
            md.dependencies.push(dd);
        }

        let packaging = self.packaging.as_deref().unwrap_or("jar");
        let mut artifact = Artifact::default_for(&id);
        if packaging == "pom" {
            artifact.type_ = "pom".to_string();
            artifact.ext = "pom".to_string();
        } else if packaging != "bundle" {
            artifact.type_ = packaging.to_string();
        }
        md.artifacts.push(artifact);
        md
    }
}

/// Configurations every POM-derived descriptor declares.
fn maven_configurations() -> Vec<Configuration> {
    let mut test = Configuration::new("test").extending(&["runtime"]);
    test.public = false;
    vec![
        Configuration::new("default").extending(&["runtime"]),
        Configuration::new("compile"),
        Configuration::new("provided"),
        Configuration::new("runtime").extending(&["compile"]),
        test,
        Configuration::new("system"),
        Configuration::new("optional"),
    ]
}

fn scope_mapping(scope: Option<&str>, optional: bool) -> ConfMapping {
    if optional {
        return ConfMapping::parse("optional->compile");
    }
    ConfMapping::parse(match scope.unwrap_or("compile") {
        "provided" => "provided->compile",
        "runtime" => "runtime->runtime",
        "test" => "test->runtime",
        "system" => "system->compile",
        _ => "compile->compile;runtime->runtime",
    })
}

/// Parse POM XML.
pub fn parse_pom(xml: &str) -> IvoryResult<Pom> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut pom = Pom::default();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut dep: Option<PomDependency> = None;
    let mut license: Option<License> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                text.clear();
                match path.join(">").as_str() {
                    "project>dependencies>dependency" => dep = Some(PomDependency::default()),
                    "project>licenses>license" => {
                        license = Some(License {
                            name: String::new(),
                            url: None,
                        })
                    }
                    "project>parent" => pom.parent = Some(ParentRef::default()),
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                text = e.unescape().unwrap_or_default().into_owned();
            }
            Ok(Event::End(_)) => {
                let value = std::mem::take(&mut text);
                let ctx = path.join(">");
                match ctx.as_str() {
                    "project>groupId" => pom.group_id = Some(value),
                    "project>artifactId" => pom.artifact_id = Some(value),
                    "project>version" => pom.version = Some(value),
                    "project>packaging" => pom.packaging = Some(value),
                    "project>name" => pom.name = Some(value),
                    "project>description" => pom.description = Some(value),
                    "project>url" => pom.url = Some(value),
                    "project>parent>groupId" | "project>parent>artifactId" | "project>parent>version" => {
                        if let Some(ref mut p) = pom.parent {
                            match path.last().map(String::as_str) {
                                Some("groupId") => p.group_id = value,
                                Some("artifactId") => p.artifact_id = value,
                                _ => p.version = value,
                            }
                        }
                    }
                    "project>dependencies>dependency" => {
                        if let Some(d) = dep.take() {
                            pom.dependencies.push(d);
                        }
                    }
                    "project>licenses>license" => {
                        if let Some(l) = license.take() {
                            pom.licenses.push(l);
                        }
                    }
                    _ if ctx.starts_with("project>dependencies>dependency>") && path.len() == 4 => {
                        if let Some(ref mut d) = dep {
                            match path[3].as_str() {
                                "groupId" => d.group_id = value,
                                "artifactId" => d.artifact_id = value,
                                "version" => d.version = Some(value),
                                "scope" => d.scope = Some(value),
                                "optional" => d.optional = value.trim() == "true",
                                "classifier" => d.classifier = Some(value),
                                _ => {}
                            }
                        }
                    }
                    "project>licenses>license>name" => {
                        if let Some(ref mut l) = license {
                            l.name = value;
                        }
                    }
                    "project>licenses>license>url" => {
                        if let Some(ref mut l) = license {
                            l.url = Some(value);
                        }
                    }
                    _ if path.len() == 3 && path[1] == "properties" => {
                        pom.properties.insert(path[2].clone(), value);
                    }
                    _ => {}
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IvoryError::Descriptor {
                    message: format!("Failed to parse POM: {e}"),
                }
                .into());
            }
            _ => {}
        }
    }

    Ok(pom)
}
