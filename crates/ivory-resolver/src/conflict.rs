//! Conflict managers and the summary of conflicts decided during a run.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use ivory_core::id::{ModuleId, ModuleRevisionId};

use crate::version::compare_revisions;

pub const LATEST_REVISION: &str = "latest-revision";
pub const LATEST_TIME: &str = "latest-time";
pub const ALL: &str = "all";
pub const STRICT: &str = "strict";

/// One competing revision of a module within a configuration.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: ModuleRevisionId,
    pub publication: Option<DateTime<Utc>>,
}

/// What a conflict manager decided for a group of candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Indices (into the candidate slice) of the revisions to keep.
    Retain(Vec<usize>),
    /// The conflict cannot be settled; every candidate is kept and flagged.
    Fail(String),
}

/// Picks the revisions to keep among same-module candidates.
///
/// Managers must never pick one of several indistinguishable candidates
/// arbitrarily: ties are all retained.
pub trait ConflictManager: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn resolve_conflicts(&self, candidates: &[Candidate]) -> ConflictDecision;
}

/// Indices of every candidate comparing equal to the greatest one.
fn retain_greatest<F>(candidates: &[Candidate], cmp: F) -> Vec<usize>
where
    F: Fn(&Candidate, &Candidate) -> Ordering,
{
    let Some(best) = candidates.iter().max_by(|a, b| cmp(a, b)) else {
        return Vec::new();
    };
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| cmp(c, best) == Ordering::Equal)
        .map(|(i, _)| i)
        .collect()
}

/// Keeps the highest revision.
#[derive(Debug, Default)]
pub struct LatestRevisionConflictManager;

impl ConflictManager for LatestRevisionConflictManager {
    fn name(&self) -> &str {
        LATEST_REVISION
    }

    fn resolve_conflicts(&self, candidates: &[Candidate]) -> ConflictDecision {
        ConflictDecision::Retain(retain_greatest(candidates, |a, b| {
            compare_revisions(&a.id.revision, &b.id.revision)
        }))
    }
}

/// Keeps the most recently published revision.
#[derive(Debug, Default)]
pub struct LatestTimeConflictManager;

impl ConflictManager for LatestTimeConflictManager {
    fn name(&self) -> &str {
        LATEST_TIME
    }

    fn resolve_conflicts(&self, candidates: &[Candidate]) -> ConflictDecision {
        ConflictDecision::Retain(retain_greatest(candidates, |a, b| {
            a.publication
                .cmp(&b.publication)
                .then_with(|| compare_revisions(&a.id.revision, &b.id.revision))
        }))
    }
}

/// Keeps every revision side by side.
#[derive(Debug, Default)]
pub struct AllConflictManager;

impl ConflictManager for AllConflictManager {
    fn name(&self) -> &str {
        ALL
    }

    fn resolve_conflicts(&self, candidates: &[Candidate]) -> ConflictDecision {
        ConflictDecision::Retain((0..candidates.len()).collect())
    }
}

/// Refuses any conflict between distinct revisions.
#[derive(Debug, Default)]
pub struct StrictConflictManager;

impl ConflictManager for StrictConflictManager {
    fn name(&self) -> &str {
        STRICT
    }

    fn resolve_conflicts(&self, candidates: &[Candidate]) -> ConflictDecision {
        let first = candidates.first().map(|c| c.id.revision.as_str());
        if candidates.iter().all(|c| Some(c.id.revision.as_str()) == first) {
            return ConflictDecision::Retain((0..candidates.len()).collect());
        }
        let revisions: Vec<&str> = candidates.iter().map(|c| c.id.revision.as_str()).collect();
        ConflictDecision::Fail(format!("strict conflict: {}", revisions.join(" vs ")))
    }
}

/// All built-in conflict managers.
pub fn builtin_conflict_managers() -> Vec<Arc<dyn ConflictManager>> {
    vec![
        Arc::new(LatestRevisionConflictManager),
        Arc::new(LatestTimeConflictManager),
        Arc::new(AllConflictManager),
        Arc::new(StrictConflictManager),
    ]
}

/// Conflicts decided in one configuration, for display.
#[derive(Debug, Default)]
pub struct ConflictReport {
    pub conflicts: Vec<ModuleConflict>,
}

/// One module whose revisions competed, with the outcome.
#[derive(Debug, Clone)]
pub struct ModuleConflict {
    pub module: ModuleId,
    pub evicted: Vec<String>,
    pub selected: Vec<String>,
    /// Manager name, or `transitive`.
    pub manager: String,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conflict: ModuleConflict) {
        self.conflicts.push(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No conflicts.");
        }
        writeln!(f, "Conflicts ({}):", self.conflicts.len())?;
        for c in &self.conflicts {
            writeln!(f, "  {c}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ModuleConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} evicted",
            self.module,
            self.evicted.join(", ")
        )?;
        if !self.selected.is_empty() {
            write!(f, " in favor of {}", self.selected.join(", "))?;
        }
        write!(f, " ({})", self.manager)
    }
}
