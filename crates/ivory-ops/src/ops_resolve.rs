//! Operation: resolve a module and download its artifacts.

use std::path::{Path, PathBuf};

use ivory_resolver::report::ConfigurationReport;
use ivory_resolver::ResolveReport;
use ivory_util::errors::IvoryResult;
use ivory_util::progress::{spinner, status, status_error, status_info, status_warn};

use crate::{load_module, report_xml, Session};

/// Options for `ivory resolve`.
#[derive(Debug, Default)]
pub struct ResolveRequest {
    /// Module file; `module.toml` in the working directory when unset.
    pub module: Option<PathBuf>,
    /// Root configurations; every public one when empty.
    pub confs: Vec<String>,
    pub no_download: bool,
    /// Write one XML report per configuration here.
    pub report_dir: Option<PathBuf>,
}

/// Resolve the module, print a summary and the problems, and write reports
/// when asked. The report is returned even when it carries errors.
pub async fn resolve(session: &Session, cwd: &Path, req: &ResolveRequest) -> IvoryResult<ResolveReport> {
    let md = load_module(req.module.as_deref(), cwd)?;
    status("Resolving", &md.id.to_string());

    let options = session
        .resolve_options()
        .with_confs(req.confs.clone())
        .with_download(!req.no_download);
    let sp = spinner(&format!("Resolving dependencies of {}...", md.id));
    let report = session.engine.resolve(md, &options).await?;
    sp.finish_and_clear();

    for line in summary(&report) {
        println!("{line}");
    }
    for conf in &report.configurations {
        for conflict in &conf.conflicts().conflicts {
            status_info("Evicted", &format!("[{}] {conflict}", conf.conf));
        }
    }

    if let Some(ref dir) = req.report_dir {
        for path in report_xml::write_all(&report, dir)? {
            tracing::debug!("wrote {}", path.display());
        }
        status("Reported", &dir.display().to_string());
    }

    let problems = report.all_problems();
    if problems.is_empty() {
        status("Resolved", &format!("{} in {} module(s)", report.root, report.revision_count()));
    } else {
        status_warn("Problems", &format!("{} problem(s) resolving {}", problems.len(), report.root));
        for p in &problems {
            status_error("Error", p);
        }
    }
    Ok(report)
}

/// One summary line per configuration.
pub fn summary(report: &ResolveReport) -> Vec<String> {
    report.configurations.iter().map(summary_line).collect()
}

fn summary_line(conf: &ConfigurationReport) -> String {
    let revisions: Vec<_> = conf.revisions().filter(|r| r.depth > 0).collect();
    let searched = revisions.iter().filter(|r| r.searched).count();
    let evicted = conf.evicted().count();
    let artifacts: Vec<_> = conf.retained().flat_map(|r| r.artifacts.iter()).collect();
    let downloaded = conf
        .retained()
        .flat_map(|r| r.artifacts.iter())
        .filter(|a| a.status == ivory_core::artifact::DownloadStatus::Successful)
        .count();
    let failed = artifacts.iter().filter(|a| a.is_failed()).count();
    format!(
        "{:>12}: {} module(s) ({searched} searched, {evicted} evicted), {} artifact(s) ({downloaded} downloaded, {failed} failed)",
        conf.conf,
        revisions.len(),
        artifacts.len(),
    )
}
