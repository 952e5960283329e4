//! Repository path patterns such as `[organisation]/[module]/[revision]/[artifact]-[revision].[ext]`.
//!
//! Tokens are substituted from a module revision id and, for artifact
//! patterns, from the artifact. Parenthesised parts like `(-[branch])` are
//! dropped when a token inside them has no value. Patterns can also be used
//! backwards to list the values a token takes on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;

use ivory_core::artifact::Artifact;
use ivory_core::id::ModuleRevisionId;
use ivory_util::errors::{IvoryError, IvoryResult};

pub const ORGANISATION: &str = "organisation";
pub const MODULE: &str = "module";
pub const REVISION: &str = "revision";

/// Descriptor pattern used when a filesystem resolver declares none.
pub const DEFAULT_IVY_PATTERN: &str = "[organisation]/[module]/[revision]/module.toml";
/// Artifact pattern used when a filesystem resolver declares none.
pub const DEFAULT_ARTIFACT_PATTERN: &str =
    "[organisation]/[module]/[revision]/[artifact]-[revision](-[classifier]).[ext]";

/// Token values of a module revision id.
pub fn module_tokens(mrid: &ModuleRevisionId) -> BTreeMap<String, String> {
    let mut tokens: BTreeMap<String, String> = mrid.extra.clone();
    tokens.insert(ORGANISATION.to_string(), mrid.organisation().to_string());
    tokens.insert("organization".to_string(), mrid.organisation().to_string());
    tokens.insert(MODULE.to_string(), mrid.name().to_string());
    tokens.insert(REVISION.to_string(), mrid.revision.clone());
    if let Some(ref branch) = mrid.branch {
        tokens.insert("branch".to_string(), branch.clone());
    }
    tokens
}

/// Token values of an artifact, module tokens included.
pub fn artifact_tokens(artifact: &Artifact) -> BTreeMap<String, String> {
    let mut tokens = module_tokens(&artifact.module);
    tokens.extend(artifact.extra.clone());
    tokens.insert("artifact".to_string(), artifact.name.clone());
    tokens.insert("type".to_string(), artifact.type_.clone());
    tokens.insert("ext".to_string(), artifact.ext.clone());
    tokens
}

/// Replace every `[token]` in `pattern`; optional groups whose tokens are
/// missing disappear. A missing token outside an optional group is an error.
pub fn substitute(pattern: &str, tokens: &BTreeMap<String, String>) -> IvoryResult<String> {
    let mut out = String::new();
    let mut rest = pattern;
    while let Some(open) = rest.find('(') {
        out.push_str(&substitute_plain(&rest[..open], tokens, pattern)?);
        let Some(close) = rest[open..].find(')') else {
            return Err(bad_pattern(pattern, "unbalanced '('"));
        };
        let group = &rest[open + 1..open + close];
        if let Ok(s) = substitute_plain(group, tokens, pattern) {
            out.push_str(&s);
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(&substitute_plain(rest, tokens, pattern)?);
    Ok(out)
}

fn substitute_plain(
    text: &str,
    tokens: &BTreeMap<String, String>,
    pattern: &str,
) -> IvoryResult<String> {
    let mut out = String::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find(']') else {
            return Err(bad_pattern(pattern, "unbalanced '['"));
        };
        let name = &rest[open + 1..open + close];
        match tokens.get(name) {
            Some(value) => out.push_str(value),
            None => return Err(bad_pattern(pattern, &format!("no value for [{name}]"))),
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn bad_pattern(pattern: &str, why: &str) -> miette::Report {
    IvoryError::config(format!("invalid pattern '{pattern}': {why}")).into()
}

/// Values `token` takes under `root`, given the other known tokens.
///
/// The pattern is cut at the path segment holding `token`; everything before
/// it must be fully known. The directory entries of that prefix whose names
/// match the segment are returned, sorted.
pub fn list_token_values(
    root: &Path,
    pattern: &str,
    token: &str,
    known: &BTreeMap<String, String>,
) -> IvoryResult<Vec<String>> {
    let marker = format!("[{token}]");
    let segments: Vec<&str> = pattern.split('/').collect();
    let Some(pos) = segments.iter().position(|s| s.contains(&marker)) else {
        return Ok(Vec::new());
    };

    let prefix = segments[..pos].join("/");
    let dir: PathBuf = if prefix.is_empty() {
        root.to_path_buf()
    } else {
        root.join(substitute(&prefix, known)?)
    };
    let matcher = segment_regex(segments[pos], token, known)?;
    let is_last = pos == segments.len() - 1;

    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Ok(Vec::new());
    };
    let mut values: Vec<String> = entries
        .flatten()
        .filter(|e| {
            e.file_type()
                .map(|t| if is_last { t.is_file() } else { t.is_dir() })
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            matcher
                .captures(&name)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .collect();
    values.sort();
    values.dedup();
    Ok(values)
}

fn segment_regex(
    segment: &str,
    token: &str,
    known: &BTreeMap<String, String>,
) -> IvoryResult<Regex> {
    let mut re = String::from("^");
    let mut rest = segment.replace(['(', ')'], "");
    let mut captured = false;
    while let Some(open) = rest.find('[') {
        re.push_str(&regex::escape(&rest[..open]));
        let Some(close) = rest[open..].find(']') else {
            return Err(bad_pattern(segment, "unbalanced '['"));
        };
        let name = rest[open + 1..open + close].to_string();
        if name == token && !captured {
            re.push_str("(.+?)");
            captured = true;
        } else if let Some(v) = known.get(&name) {
            re.push_str(&regex::escape(v));
        } else {
            re.push_str(".*?");
        }
        rest = rest[open + close + 1..].to_string();
    }
    re.push_str(&regex::escape(&rest));
    re.push('$');
    Regex::new(&re).map_err(|e| bad_pattern(segment, &e.to_string()))
}
