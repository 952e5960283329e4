//! Handler for `ivory tree`.

use std::path::PathBuf;

use miette::Result;

use ivory_ops::ops_tree::{self, TreeOptions};
use ivory_ops::Session;

pub async fn exec(
    session: &Session,
    cwd: PathBuf,
    module: Option<PathBuf>,
    conf: Option<String>,
    evicted: bool,
    invert: Option<String>,
    conflicts: bool,
) -> Result<()> {
    let opts = TreeOptions {
        module,
        conf,
        evicted,
        invert,
        conflicts,
    };
    let report = ops_tree::tree(session, &cwd, &opts).await?;
    for p in report.all_problems() {
        ivory_util::progress::status_warn("Problem", &p);
    }
    Ok(())
}
