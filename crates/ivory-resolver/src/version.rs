//! Revision ordering and dynamic revision matching.
//!
//! Revisions are split on `.`, `-`, `_` and `+` into segments:
//! - numeric segments compare as numbers
//! - well-known qualifiers have a fixed ordering:
//!   `dev` < `alpha` < `beta` < `milestone` < `rc` < `snapshot` < release < `sp`
//! - any other text sorts below numbers and compares case-insensitively
//!
//! Dynamic revisions are `[1.0,2.0)`-style ranges, `1.+` prefixes and
//! `latest.<status>`.

use std::cmp::Ordering;
use std::fmt;

use ivory_core::descriptor::status_rank;

/// A parsed revision with comparable segments.
#[derive(Debug, Clone)]
pub struct Revision {
    pub original: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Segment {
    Number(u64),
    Qualifier(Qualifier),
    Text(String),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
enum Qualifier {
    Dev,
    Alpha,
    Beta,
    Milestone,
    Rc,
    Snapshot,
    Release,
    Sp,
}

impl Revision {
    pub fn parse(revision: &str) -> Self {
        Self {
            original: revision.to_string(),
            segments: segments_of(revision),
        }
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Revision {}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| compare(self.segments.get(i), other.segments.get(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Compare two revision strings.
pub fn compare_revisions(a: &str, b: &str) -> Ordering {
    Revision::parse(a).cmp(&Revision::parse(b))
}

fn compare(a: Option<&Segment>, b: Option<&Segment>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(s), None) => against_missing(s),
        (None, Some(s)) => against_missing(s).reverse(),
        (Some(a), Some(b)) => compare_present(a, b),
    }
}

/// A missing segment behaves like `0` for numbers and like a release for qualifiers.
fn against_missing(seg: &Segment) -> Ordering {
    match seg {
        Segment::Number(n) => n.cmp(&0),
        Segment::Qualifier(q) => q.cmp(&Qualifier::Release),
        Segment::Text(_) => Ordering::Less,
    }
}

fn compare_present(a: &Segment, b: &Segment) -> Ordering {
    use Segment::*;
    match (a, b) {
        (Number(a), Number(b)) => a.cmp(b),
        (Qualifier(a), Qualifier(b)) => a.cmp(b),
        (Text(a), Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Number(_), _) => Ordering::Greater,
        (_, Number(_)) => Ordering::Less,
        (Qualifier(q), Text(_)) => {
            if *q >= self::Qualifier::Release {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Text(_), Qualifier(q)) => {
            if *q >= self::Qualifier::Release {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    }
}

fn segments_of(revision: &str) -> Vec<Segment> {
    revision
        .split(['.', '-', '_', '+'])
        .filter(|t| !t.is_empty())
        .flat_map(split_digit_boundaries)
        .map(|t| classify(&t))
        .collect()
}

/// `1rc2` is read as `1`, `rc`, `2`.
fn split_digit_boundaries(token: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut last_digit: Option<bool> = None;
    for ch in token.chars() {
        let digit = ch.is_ascii_digit();
        if last_digit.is_some_and(|d| d != digit) {
            out.push(std::mem::take(&mut current));
        }
        current.push(ch);
        last_digit = Some(digit);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn classify(token: &str) -> Segment {
    if let Ok(n) = token.parse::<u64>() {
        return Segment::Number(n);
    }
    let q = match token.to_lowercase().as_str() {
        "dev" => Qualifier::Dev,
        "alpha" | "a" => Qualifier::Alpha,
        "beta" | "b" => Qualifier::Beta,
        "milestone" | "m" => Qualifier::Milestone,
        "rc" | "cr" => Qualifier::Rc,
        "snapshot" => Qualifier::Snapshot,
        "ga" | "final" | "release" => Qualifier::Release,
        "sp" => Qualifier::Sp,
        _ => return Segment::Text(token.to_string()),
    };
    Segment::Qualifier(q)
}

/// One side of a revision range.
#[derive(Debug, Clone)]
pub struct Bound {
    pub revision: Revision,
    pub inclusive: bool,
}

/// A revision range: `[1.0,2.0)`, `[1.0,)`, `(,2.0]`, `[1.5]`.
///
/// `]1.0,2.0[` is accepted as an alias of `(1.0,2.0)`.
#[derive(Debug, Clone)]
pub struct RevisionRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl RevisionRange {
    /// Returns `None` when `expr` is not a range expression.
    pub fn parse(expr: &str) -> Option<Self> {
        let s = expr.trim();
        let first = s.chars().next()?;
        let last = s.chars().last()?;
        if !matches!(first, '[' | '(' | ']') || !matches!(last, ']' | ')' | '[') || s.len() < 2 {
            return None;
        }
        let lower_inclusive = first == '[';
        let upper_inclusive = last == ']';
        let inner = &s[1..s.len() - 1];

        let bound = |text: &str, inclusive: bool| {
            let text = text.trim();
            (!text.is_empty()).then(|| Bound {
                revision: Revision::parse(text),
                inclusive,
            })
        };

        match inner.split_once(',') {
            Some((lower, upper)) => Some(Self {
                lower: bound(lower, lower_inclusive),
                upper: bound(upper, upper_inclusive),
            }),
            None => {
                let exact = bound(inner, true)?;
                Some(Self {
                    lower: Some(exact.clone()),
                    upper: Some(exact),
                })
            }
        }
    }

    pub fn contains(&self, revision: &Revision) -> bool {
        let above_lower = self.lower.as_ref().map_or(true, |b| match revision.cmp(&b.revision) {
            Ordering::Greater => true,
            Ordering::Equal => b.inclusive,
            Ordering::Less => false,
        });
        let below_upper = self.upper.as_ref().map_or(true, |b| match revision.cmp(&b.revision) {
            Ordering::Less => true,
            Ordering::Equal => b.inclusive,
            Ordering::Greater => false,
        });
        above_lower && below_upper
    }
}

/// How an asked revision selects among a repository's revisions.
#[derive(Debug, Clone)]
pub enum RevisionMatcher {
    /// A fixed revision; no listing needed.
    Exact(String),
    Range(RevisionRange),
    /// `1.+` / `1.0+`: any revision starting with the prefix.
    Prefix(String),
    /// `latest.<status>`: the latest revision whose status is at least `<status>`.
    Latest(String),
}

impl RevisionMatcher {
    pub fn parse(revision: &str) -> Self {
        if let Some(status) = revision.strip_prefix("latest.") {
            return Self::Latest(status.to_string());
        }
        if let Some(range) = RevisionRange::parse(revision) {
            return Self::Range(range);
        }
        if let Some(prefix) = revision.strip_suffix('+') {
            return Self::Prefix(prefix.to_string());
        }
        Self::Exact(revision.to_string())
    }

    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    /// Whether accepting a candidate requires its descriptor (status check).
    pub fn needs_descriptor(&self) -> bool {
        matches!(self, Self::Latest(_))
    }

    /// Match on the revision string alone.
    pub fn accepts(&self, revision: &str) -> bool {
        match self {
            Self::Exact(r) => r == revision,
            Self::Range(range) => range.contains(&Revision::parse(revision)),
            Self::Prefix(prefix) => revision.starts_with(prefix.as_str()),
            Self::Latest(_) => true,
        }
    }

    /// Match on the candidate's descriptor status; only `latest.<status>` filters here.
    pub fn accepts_status(&self, status: &str) -> bool {
        match self {
            Self::Latest(wanted) => status_rank(status) >= status_rank(wanted),
            _ => true,
        }
    }
}

/// Whether an asked revision needs a repository listing to resolve.
pub fn is_dynamic(revision: &str) -> bool {
    RevisionMatcher::parse(revision).is_dynamic()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> Revision {
        Revision::parse(s)
    }

    #[test]
    fn numeric_ordering() {
        assert!(r("1.0") < r("2.0"));
        assert!(r("1.9") < r("1.10"));
        assert!(r("1.0.0") < r("1.0.1"));
    }

    #[test]
    fn qualifier_ordering() {
        assert!(r("1.0-dev") < r("1.0-alpha"));
        assert!(r("1.0-alpha") < r("1.0-beta"));
        assert!(r("1.0-beta") < r("1.0-rc1"));
        assert!(r("1.0-rc1") < r("1.0"));
        assert!(r("1.0") < r("1.0-sp"));
        assert!(r("1.0-SNAPSHOT") < r("1.0"));
    }

    #[test]
    fn digit_letter_boundaries() {
        assert!(r("1.0rc1") < r("1.0rc2"));
        assert!(r("1.0rc2") < r("1.0"));
    }

    #[test]
    fn trailing_zeros_equal() {
        assert_eq!(r("1.0"), r("1.0.0"));
        assert_eq!(compare_revisions("2", "2.0"), Ordering::Equal);
    }

    #[test]
    fn text_sorts_below_numbers() {
        assert!(r("1.0.0-jre") < r("1.0.0"));
        assert!(r("31.0-jre") < r("32.0-jre"));
    }

    #[test]
    fn range_bounds() {
        let range = RevisionRange::parse("[1.0,2.0)").unwrap();
        assert!(range.contains(&r("1.0")));
        assert!(range.contains(&r("1.9")));
        assert!(!range.contains(&r("2.0")));
        assert!(!range.contains(&r("0.9")));

        let open = RevisionRange::parse("]1.0,2.0[").unwrap();
        assert!(!open.contains(&r("1.0")));
        assert!(open.contains(&r("1.5")));

        let unbounded = RevisionRange::parse("[1.0,)").unwrap();
        assert!(unbounded.contains(&r("99")));
    }

    #[test]
    fn exact_range() {
        let range = RevisionRange::parse("[1.5]").unwrap();
        assert!(range.contains(&r("1.5")));
        assert!(!range.contains(&r("1.6")));
    }

    #[test]
    fn matcher_kinds() {
        assert!(!RevisionMatcher::parse("1.0").is_dynamic());
        assert!(RevisionMatcher::parse("[1.0,2.0)").is_dynamic());
        assert!(RevisionMatcher::parse("1.+").is_dynamic());
        assert!(RevisionMatcher::parse("latest.integration").is_dynamic());
        assert!(is_dynamic("latest.release"));
        assert!(!is_dynamic("2.3.1"));
    }

    #[test]
    fn prefix_matcher() {
        let m = RevisionMatcher::parse("1.+");
        assert!(m.accepts("1.0"));
        assert!(m.accepts("1.9.2"));
        assert!(!m.accepts("2.0"));
    }

    #[test]
    fn latest_status_matcher() {
        let m = RevisionMatcher::parse("latest.milestone");
        assert!(m.needs_descriptor());
        assert!(m.accepts("anything"));
        assert!(m.accepts_status("release"));
        assert!(m.accepts_status("milestone"));
        assert!(!m.accepts_status("integration"));
    }
}
