//! Operation: resolve and write machine-readable reports.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ivory_resolver::ResolveReport;
use ivory_util::errors::{IvoryError, IvoryResult};
use ivory_util::progress::status;

use crate::{load_module, report_xml, Session};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Xml,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xml" => Ok(ReportFormat::Xml),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{other}' (expected xml or json)")),
        }
    }
}

/// Options for `ivory report`.
#[derive(Debug, Default)]
pub struct ReportOptions {
    pub module: Option<PathBuf>,
    pub confs: Vec<String>,
    pub format: ReportFormat,
    /// Directory to write into; stdout when unset.
    pub output: Option<PathBuf>,
}

pub async fn report(session: &Session, cwd: &Path, opts: &ReportOptions) -> IvoryResult<ResolveReport> {
    let md = load_module(opts.module.as_deref(), cwd)?;
    let options = session
        .resolve_options()
        .with_confs(opts.confs.clone())
        .with_download(false);
    let report = session.engine.resolve(md, &options).await?;

    match opts.output {
        Some(ref dir) => {
            for path in write(&report, opts.format, dir)? {
                status("Wrote", &path.display().to_string());
            }
        }
        None => print!("{}", render(&report, opts.format)?),
    }
    Ok(report)
}

/// The whole report as one document. XML output concatenates one
/// `ivy-report` per configuration.
pub fn render(report: &ResolveReport, format: ReportFormat) -> IvoryResult<String> {
    match format {
        ReportFormat::Json => to_json(report),
        ReportFormat::Xml => {
            let mut out = String::new();
            for conf in &report.configurations {
                out.push_str(&report_xml::render(report, conf)?);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

pub fn write(report: &ResolveReport, format: ReportFormat, dir: &Path) -> IvoryResult<Vec<PathBuf>> {
    match format {
        ReportFormat::Xml => report_xml::write_all(report, dir),
        ReportFormat::Json => {
            ivory_util::fs::ensure_dir(dir).map_err(IvoryError::Io)?;
            let path = dir.join(format!("{}.json", report.resolve_id));
            std::fs::write(&path, to_json(report)?).map_err(IvoryError::Io)?;
            Ok(vec![path])
        }
    }
}

fn to_json(report: &ResolveReport) -> IvoryResult<String> {
    serde_json::to_string_pretty(report).map_err(|e| {
        IvoryError::Generic {
            message: format!("Failed to serialize report: {e}"),
        }
        .into()
    })
}
