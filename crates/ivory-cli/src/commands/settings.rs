//! Handler for `ivory settings`.

use miette::Result;

use ivory_ops::{ops_settings, Session};

pub fn exec(session: &Session) -> Result<()> {
    print!("{}", ops_settings::describe(session));
    Ok(())
}
