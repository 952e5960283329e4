//! `maven-metadata.xml` reading, used to list the revisions of a module.

use quick_xml::events::Event;
use quick_xml::Reader;

use ivory_util::errors::{IvoryError, IvoryResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MavenMetadata {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub latest: Option<String>,
    pub release: Option<String>,
    pub versions: Vec<String>,
    /// `yyyyMMddHHmmss`, as published.
    pub last_updated: Option<String>,
}

/// Parse an artifact-level `maven-metadata.xml`.
pub fn parse_metadata(xml: &str) -> IvoryResult<MavenMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut meta = MavenMetadata::default();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                text.clear();
            }
            Ok(Event::Text(ref e)) => {
                text = e.unescape().unwrap_or_default().into_owned();
            }
            Ok(Event::End(_)) => {
                let value = std::mem::take(&mut text);
                match path.join(">").as_str() {
                    "metadata>groupId" => meta.group_id = Some(value),
                    "metadata>artifactId" => meta.artifact_id = Some(value),
                    "metadata>versioning>latest" => meta.latest = Some(value),
                    "metadata>versioning>release" => meta.release = Some(value),
                    "metadata>versioning>lastUpdated" => meta.last_updated = Some(value),
                    "metadata>versioning>versions>version" if !value.is_empty() => {
                        meta.versions.push(value)
                    }
                    _ => {}
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IvoryError::Descriptor {
                    message: format!("Failed to parse maven-metadata.xml: {e}"),
                }
                .into());
            }
            _ => {}
        }
    }

    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_versions_in_document_order() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>org.example</groupId>
  <artifactId>lib</artifactId>
  <versioning>
    <latest>2.0</latest>
    <release>2.0</release>
    <versions>
      <version>1.0</version>
      <version>1.5</version>
      <version>2.0</version>
    </versions>
    <lastUpdated>20240101120000</lastUpdated>
  </versioning>
</metadata>"#;
        let meta = parse_metadata(xml).unwrap();
        assert_eq!(meta.artifact_id.as_deref(), Some("lib"));
        assert_eq!(meta.release.as_deref(), Some("2.0"));
        assert_eq!(meta.versions, vec!["1.0", "1.5", "2.0"]);
        assert_eq!(meta.last_updated.as_deref(), Some("20240101120000"));
    }

    #[test]
    fn malformed_metadata_is_an_error() {
        assert!(parse_metadata("<metadata><versioning></metadata>").is_err());
    }
}
