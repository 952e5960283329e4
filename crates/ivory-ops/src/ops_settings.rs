//! Operation: show the effective engine settings.

use crate::Session;

/// Human-readable dump of resolvers, namespaces, strategies and managers.
pub fn describe(session: &Session) -> String {
    let ctx = session.engine.context();
    let (namespaces, strategies, managers) = ctx.names();
    let default = session.engine.default_resolver().unwrap_or("none");

    let mut out = String::new();
    out.push_str(&format!("cache: {}\n", session.config.cache_dir().display()));
    out.push_str(&format!("validate: {}\n", ctx.validate()));
    out.push_str(&format!("resolvers (default: {default}):\n"));
    for r in session.engine.resolvers() {
        out.push_str(&format!("  {}\n", r.describe()));
    }
    out.push_str(&format!("namespaces: {}\n", namespaces.join(", ")));
    out.push_str(&format!(
        "latest strategies: {} (default: {})\n",
        strategies.join(", "),
        ctx.default_latest_strategy().name()
    ));
    out.push_str(&format!(
        "conflict managers: {} (default: {})\n",
        managers.join(", "),
        ctx.default_conflict_manager().name()
    ));
    if !session.config.modules.is_empty() {
        out.push_str("module rules:\n");
        for rule in &session.config.modules {
            out.push_str(&format!(
                "  {}#{} resolver={} conflict-manager={}\n",
                rule.organisation,
                rule.name,
                rule.resolver.as_deref().unwrap_or("-"),
                rule.conflict_manager.as_deref().unwrap_or("-"),
            ));
        }
    }
    out
}
