//! `ivy-report` XML rendering of one configuration of a resolve report.
//!
//! Attribute values go through the writer's escaping, so names and messages
//! may contain any character.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, Event};
use quick_xml::Writer;

use ivory_resolver::report::{ConfigurationReport, RevisionReport};
use ivory_resolver::ResolveReport;
use ivory_util::errors::{IvoryError, IvoryResult};

/// Date layout used in reports.
pub const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Stylesheet processing instruction written after the declaration.
pub const STYLESHEET: &str = r#"xml-stylesheet type="text/xsl" href="ivy-report.xsl""#;

pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// File name of the report of `conf`: `<resolve-id>-<conf>.xml`.
pub fn file_name(report: &ResolveReport, conf: &str) -> String {
    format!("{}-{conf}.xml", report.resolve_id)
}

/// Render the report of `conf` as XML.
pub fn render(report: &ResolveReport, conf: &ConfigurationReport) -> IvoryResult<String> {
    let mut w = Writer::new_with_indent(Vec::new(), b'\t', 1);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    w.write_event(Event::PI(BytesPI::new(STYLESHEET)))
        .map_err(xml_err)?;

    let mut root = BytesStart::new("ivy-report");
    root.push_attribute(("version", "1.0"));
    w.write_event(Event::Start(root)).map_err(xml_err)?;

    let mut info = BytesStart::new("info");
    info.push_attribute(("organisation", report.root.organisation()));
    info.push_attribute(("module", report.root.name()));
    info.push_attribute(("revision", report.root.revision.as_str()));
    if let Some(ref branch) = report.root.branch {
        info.push_attribute(("branch", branch.as_str()));
    }
    for (k, v) in &report.root.extra {
        info.push_attribute((format!("extra-{k}").as_str(), v.as_str()));
    }
    info.push_attribute(("conf", conf.conf.as_str()));
    info.push_attribute(("confs", report.confs.join(", ").as_str()));
    info.push_attribute(("date", format_date(&report.date).as_str()));
    w.write_event(Event::Empty(info)).map_err(xml_err)?;

    w.write_event(Event::Start(BytesStart::new("dependencies")))
        .map_err(xml_err)?;
    for module in &conf.modules {
        let mut el = BytesStart::new("module");
        el.push_attribute(("organisation", module.module.organisation.as_str()));
        el.push_attribute(("name", module.module.name.as_str()));
        el.push_attribute(("resolver", module.resolver.as_deref().unwrap_or("")));
        w.write_event(Event::Start(el)).map_err(xml_err)?;
        for rev in &module.revisions {
            write_revision(&mut w, rev)?;
        }
        w.write_event(Event::End(BytesEnd::new("module")))
            .map_err(xml_err)?;
    }
    w.write_event(Event::End(BytesEnd::new("dependencies")))
        .map_err(xml_err)?;
    w.write_event(Event::End(BytesEnd::new("ivy-report")))
        .map_err(xml_err)?;

    String::from_utf8(w.into_inner()).map_err(xml_err)
}

fn write_revision(w: &mut Writer<Vec<u8>>, rev: &RevisionReport) -> IvoryResult<()> {
    let mut el = BytesStart::new("revision");
    el.push_attribute(("name", rev.id.revision.as_str()));
    if let Some(ref branch) = rev.id.branch {
        el.push_attribute(("branch", branch.as_str()));
    }
    if let Some(ref status) = rev.status {
        el.push_attribute(("status", status.as_str()));
        let pubdate = rev.publication.as_ref().map(format_date).unwrap_or_default();
        el.push_attribute(("pubdate", pubdate.as_str()));
        el.push_attribute(("resolver", rev.resolver.as_deref().unwrap_or("")));
        el.push_attribute(("artresolver", rev.artifact_resolver.as_deref().unwrap_or("")));
    }
    if let Some(ref ev) = rev.evicted {
        el.push_attribute(("evicted", ev.manager.as_str()));
        el.push_attribute(("evicted-reason", ev.reason.as_str()));
    }
    if let Some(ref error) = rev.error {
        el.push_attribute(("error", error.as_str()));
    }
    if let Some(ref home) = rev.home_page {
        el.push_attribute(("homepage", home.as_str()));
    }
    for (k, v) in &rev.extra {
        el.push_attribute((format!("extra-{k}").as_str(), v.as_str()));
    }
    el.push_attribute(("downloaded", bool_str(rev.downloaded)));
    el.push_attribute(("searched", bool_str(rev.searched)));
    if rev.status.is_some() {
        el.push_attribute(("default", bool_str(rev.default)));
    }
    el.push_attribute(("conf", rev.confs.join(", ").as_str()));
    el.push_attribute(("position", rev.position.to_string().as_str()));
    w.write_event(Event::Start(el)).map_err(xml_err)?;

    for license in &rev.licenses {
        let mut l = BytesStart::new("license");
        l.push_attribute(("name", license.name.as_str()));
        if let Some(ref url) = license.url {
            l.push_attribute(("url", url.as_str()));
        }
        w.write_event(Event::Empty(l)).map_err(xml_err)?;
    }
    if let Some(ref ev) = rev.evicted {
        for selected in &ev.selected {
            let mut e = BytesStart::new("evicted-by");
            e.push_attribute(("rev", selected.as_str()));
            w.write_event(Event::Empty(e)).map_err(xml_err)?;
        }
    }
    for caller in &rev.callers {
        let mut c = BytesStart::new("caller");
        c.push_attribute(("organisation", caller.organisation.as_str()));
        c.push_attribute(("name", caller.name.as_str()));
        c.push_attribute(("conf", caller.confs.join(", ").as_str()));
        c.push_attribute(("rev", caller.rev.as_str()));
        c.push_attribute(("callerrev", caller.callerrev.as_str()));
        for (k, v) in &caller.extra {
            c.push_attribute((format!("extra-{k}").as_str(), v.as_str()));
        }
        w.write_event(Event::Empty(c)).map_err(xml_err)?;
    }

    w.write_event(Event::Start(BytesStart::new("artifacts")))
        .map_err(xml_err)?;
    for adr in &rev.artifacts {
        let mut a = BytesStart::new("artifact");
        a.push_attribute(("name", adr.artifact.name.as_str()));
        a.push_attribute(("type", adr.artifact.type_.as_str()));
        a.push_attribute(("ext", adr.artifact.ext.as_str()));
        for (k, v) in &adr.artifact.extra {
            a.push_attribute((format!("extra-{k}").as_str(), v.as_str()));
        }
        a.push_attribute(("status", adr.status.to_string().as_str()));
        a.push_attribute(("size", adr.size.to_string().as_str()));
        match adr.origin {
            Some(ref origin) => {
                w.write_event(Event::Start(a)).map_err(xml_err)?;
                let mut o = BytesStart::new("origin-location");
                o.push_attribute(("is-local", bool_str(origin.is_local)));
                o.push_attribute(("location", origin.location.as_str()));
                w.write_event(Event::Empty(o)).map_err(xml_err)?;
                w.write_event(Event::End(BytesEnd::new("artifact")))
                    .map_err(xml_err)?;
            }
            None => w.write_event(Event::Empty(a)).map_err(xml_err)?,
        }
    }
    w.write_event(Event::End(BytesEnd::new("artifacts")))
        .map_err(xml_err)?;
    w.write_event(Event::End(BytesEnd::new("revision")))
        .map_err(xml_err)?;
    Ok(())
}

/// Write one XML file per configuration into `dir`; returns the written paths.
pub fn write_all(report: &ResolveReport, dir: &Path) -> IvoryResult<Vec<PathBuf>> {
    ivory_util::fs::ensure_dir(dir).map_err(IvoryError::Io)?;
    let mut written = Vec::new();
    for conf in &report.configurations {
        let path = dir.join(file_name(report, &conf.conf));
        std::fs::write(&path, render(report, conf)?).map_err(IvoryError::Io)?;
        written.push(path);
    }
    Ok(written)
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

fn xml_err(e: impl Display) -> miette::Report {
    IvoryError::Generic {
        message: format!("Failed to write report XML: {e}"),
    }
    .into()
}
