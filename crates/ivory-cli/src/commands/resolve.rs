//! Handler for `ivory resolve`.

use std::path::PathBuf;

use miette::Result;

use ivory_ops::ops_resolve::{self, ResolveRequest};
use ivory_ops::Session;

pub async fn exec(
    session: &Session,
    cwd: PathBuf,
    module: Option<PathBuf>,
    confs: Vec<String>,
    no_download: bool,
    report_dir: Option<PathBuf>,
) -> Result<()> {
    let req = ResolveRequest {
        module,
        confs,
        no_download,
        report_dir,
    };
    let report = ops_resolve::resolve(session, &cwd, &req).await?;
    super::check(&report)
}
