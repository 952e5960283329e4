//! Operation: display the dependency tree.

use std::path::{Path, PathBuf};

use ivory_resolver::ResolveReport;
use ivory_util::errors::{IvoryError, IvoryResult};

use crate::{load_module, Session};

/// Options for `ivory tree`.
#[derive(Debug, Default)]
pub struct TreeOptions {
    pub module: Option<PathBuf>,
    /// Configuration to show; every resolved one when unset.
    pub conf: Option<String>,
    /// Show evicted revisions too.
    pub evicted: bool,
    /// Show who pulls in this module (`org#name` or `name`) instead.
    pub invert: Option<String>,
    /// Show the conflicts that were settled.
    pub conflicts: bool,
}

/// Resolve without downloading and print the tree.
pub async fn tree(session: &Session, cwd: &Path, opts: &TreeOptions) -> IvoryResult<ResolveReport> {
    let md = load_module(opts.module.as_deref(), cwd)?;
    let confs = opts.conf.iter().cloned().collect();
    let options = session
        .resolve_options()
        .with_confs(confs)
        .with_download(false);
    let report = session.engine.resolve(md, &options).await?;
    print!("{}", render(&report, opts)?);
    Ok(report)
}

/// Text shown by `ivory tree` for a finished report.
pub fn render(report: &ResolveReport, opts: &TreeOptions) -> IvoryResult<String> {
    let confs: Vec<_> = match opts.conf {
        Some(ref c) => match report.configuration(c) {
            Some(conf) => vec![conf],
            None => {
                return Err(IvoryError::resolution(format!(
                    "unknown configuration '{c}' in {}",
                    report.root
                ))
                .into())
            }
        },
        None => report.configurations.iter().collect(),
    };

    let mut out = String::new();
    for conf in confs {
        if opts.conflicts {
            out.push_str(&format!("[{}] {}\n", conf.conf, conf.conflicts()));
            continue;
        }
        match opts.invert {
            Some(ref target) => {
                let inverted = conf.print_inverted_tree(target);
                if inverted.is_empty() {
                    out.push_str(&format!("[{}] '{target}' is not a dependency\n", conf.conf));
                } else {
                    out.push_str(&inverted);
                }
            }
            None => out.push_str(&conf.print_tree(&report.root, opts.evicted)),
        }
    }
    Ok(out)
}
