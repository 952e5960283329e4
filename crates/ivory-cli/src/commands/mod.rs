//! Command dispatch and handler modules.

mod list;
mod report;
mod resolve;
mod settings;
mod tree;

use miette::Result;

use ivory_ops::Session;
use ivory_resolver::ResolveReport;
use ivory_util::errors::IvoryError;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().map_err(IvoryError::Io)?;
    let session = Session::load(cli.settings.as_deref(), &cwd)?;

    match cli.command {
        Command::Resolve {
            module,
            confs,
            no_download,
            report_dir,
        } => resolve::exec(&session, cwd, module, confs, no_download, report_dir).await,
        Command::Tree {
            module,
            conf,
            evicted,
            invert,
            conflicts,
        } => tree::exec(&session, cwd, module, conf, evicted, invert, conflicts).await,
        Command::Report {
            module,
            confs,
            format,
            output,
        } => report::exec(&session, cwd, module, confs, format, output).await,
        Command::List { what, resolver } => list::exec(&session, what, resolver).await,
        Command::Settings => settings::exec(&session),
    }
}

/// Turn a report with errors into a failing exit status.
fn check(report: &ResolveReport) -> Result<()> {
    if !report.has_error() {
        return Ok(());
    }
    Err(IvoryError::Resolution {
        message: format!(
            "resolution of {} failed with {} problem(s)",
            report.root,
            report.all_problems().len()
        ),
    }
    .into())
}
