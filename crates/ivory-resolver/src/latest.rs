//! Latest-revision strategies: how candidate revisions are ordered and which
//! one counts as the latest.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::version::compare_revisions;

pub const LATEST_REVISION: &str = "latest-revision";
pub const LATEST_LEXICO: &str = "latest-lexico";
pub const LATEST_TIME: &str = "latest-time";

/// A candidate revision and, when known, its publication time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub revision: String,
    pub publication: Option<DateTime<Utc>>,
}

impl ArtifactInfo {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            publication: None,
        }
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.publication = Some(at);
        self
    }
}

/// A named ordering over candidate revisions.
pub trait LatestStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn compare(&self, a: &ArtifactInfo, b: &ArtifactInfo) -> Ordering;

    /// Candidates in ascending order; the latest is last.
    fn sort(&self, mut infos: Vec<ArtifactInfo>) -> Vec<ArtifactInfo> {
        infos.sort_by(|a, b| self.compare(a, b));
        infos
    }

    /// The greatest candidate, ignoring those published after `date`.
    ///
    /// Candidates without a publication time are never excluded by `date`.
    fn find_latest(
        &self,
        infos: &[ArtifactInfo],
        date: Option<DateTime<Utc>>,
    ) -> Option<ArtifactInfo> {
        let eligible: Vec<ArtifactInfo> = infos
            .iter()
            .filter(|i| match (date, i.publication) {
                (Some(cutoff), Some(published)) => published <= cutoff,
                _ => true,
            })
            .cloned()
            .collect();
        self.sort(eligible).pop()
    }
}

/// Revision order (numeric segments, known qualifiers).
#[derive(Debug, Default)]
pub struct LatestRevisionStrategy;

impl LatestStrategy for LatestRevisionStrategy {
    fn name(&self) -> &str {
        LATEST_REVISION
    }

    fn compare(&self, a: &ArtifactInfo, b: &ArtifactInfo) -> Ordering {
        compare_revisions(&a.revision, &b.revision)
    }
}

/// Plain string order.
#[derive(Debug, Default)]
pub struct LatestLexicoStrategy;

impl LatestStrategy for LatestLexicoStrategy {
    fn name(&self) -> &str {
        LATEST_LEXICO
    }

    fn compare(&self, a: &ArtifactInfo, b: &ArtifactInfo) -> Ordering {
        a.revision.cmp(&b.revision)
    }
}

/// Publication time; unknown times sort first, ties fall back to revision order.
#[derive(Debug, Default)]
pub struct LatestTimeStrategy;

impl LatestStrategy for LatestTimeStrategy {
    fn name(&self) -> &str {
        LATEST_TIME
    }

    fn compare(&self, a: &ArtifactInfo, b: &ArtifactInfo) -> Ordering {
        a.publication
            .cmp(&b.publication)
            .then_with(|| compare_revisions(&a.revision, &b.revision))
    }
}

/// All built-in strategies.
pub fn builtin_strategies() -> Vec<Arc<dyn LatestStrategy>> {
    vec![
        Arc::new(LatestRevisionStrategy),
        Arc::new(LatestLexicoStrategy),
        Arc::new(LatestTimeStrategy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn revs(infos: &[ArtifactInfo]) -> Vec<&str> {
        infos.iter().map(|i| i.revision.as_str()).collect()
    }

    #[test]
    fn revision_vs_lexico_order() {
        let infos = vec![
            ArtifactInfo::new("1.10"),
            ArtifactInfo::new("1.9"),
            ArtifactInfo::new("1.2"),
        ];
        let by_rev = LatestRevisionStrategy.sort(infos.clone());
        assert_eq!(revs(&by_rev), vec!["1.2", "1.9", "1.10"]);
        let lexico = LatestLexicoStrategy.sort(infos);
        assert_eq!(revs(&lexico), vec!["1.10", "1.2", "1.9"]);
    }

    #[test]
    fn time_strategy_uses_publication() {
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let infos = vec![
            ArtifactInfo::new("2.0").published(old),
            ArtifactInfo::new("1.0").published(new),
        ];
        let latest = LatestTimeStrategy.find_latest(&infos, None).unwrap();
        assert_eq!(latest.revision, "1.0");
    }

    #[test]
    fn find_latest_respects_date_cutoff() {
        let jan = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let jun = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
        let infos = vec![
            ArtifactInfo::new("1.0").published(jan),
            ArtifactInfo::new("2.0").published(jun),
        ];
        let cutoff = Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap();
        let latest = LatestRevisionStrategy.find_latest(&infos, Some(cutoff)).unwrap();
        assert_eq!(latest.revision, "1.0");
        assert!(LatestRevisionStrategy.find_latest(&[], None).is_none());
    }

    #[test]
    fn builtin_names_are_unique() {
        let names: Vec<String> = builtin_strategies()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec![LATEST_REVISION, LATEST_LEXICO, LATEST_TIME]);
    }
}
