//! Handler for `ivory report`.

use std::path::PathBuf;

use miette::Result;

use ivory_ops::ops_report::{self, ReportFormat, ReportOptions};
use ivory_ops::Session;

pub async fn exec(
    session: &Session,
    cwd: PathBuf,
    module: Option<PathBuf>,
    confs: Vec<String>,
    format: ReportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let opts = ReportOptions {
        module,
        confs,
        format,
        output,
    };
    let report = ops_report::report(session, &cwd, &opts).await?;
    super::check(&report)
}
