//! Handler for `ivory list`.

use miette::Result;

use ivory_ops::ops_list::{self, ListQuery};
use ivory_ops::Session;

use crate::cli::ListAction;

pub async fn exec(session: &Session, what: ListAction, resolver: Option<String>) -> Result<()> {
    let query = match what {
        ListAction::Orgs => ListQuery::Organisations,
        ListAction::Modules { organisation } => ListQuery::Modules { organisation },
        ListAction::Revisions {
            organisation,
            module,
        } => ListQuery::Revisions {
            organisation,
            module,
        },
    };
    let entries = ops_list::list(session, &query, resolver.as_deref()).await?;
    if entries.is_empty() {
        println!("Nothing found.");
    }
    for e in entries {
        println!("{e}");
    }
    Ok(())
}
