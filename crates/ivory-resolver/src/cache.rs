//! Per-run fetch cache guaranteeing at most one repository fetch per key.
//!
//! Keys are system-space ids: concrete ids for descriptor fetches and the
//! dynamic asked id for revision searches. Every key owns a
//! `tokio::sync::OnceCell`; concurrent requests for the same key wait on the
//! first one instead of fetching again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use ivory_core::id::ModuleRevisionId;

use crate::resolver::ResolvedModule;

/// Result of a fetch: found, not found, or the failure message.
pub type FetchOutcome = Result<Option<ResolvedModule>, String>;

#[derive(Debug, Default)]
pub struct FetchCache {
    cells: Mutex<HashMap<ModuleRevisionId, Arc<OnceCell<FetchOutcome>>>>,
    fetches: AtomicUsize,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, id: &ModuleRevisionId) -> Arc<OnceCell<FetchOutcome>> {
        let mut cells = self
            .cells
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cells.entry(id.clone()).or_default().clone()
    }

    /// The outcome for `id`, running `fetch` only if no other request for the
    /// same id has run (or is running) it.
    pub async fn get_or_fetch<F, Fut>(&self, id: &ModuleRevisionId, fetch: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        let cell = self.cell(id);
        cell.get_or_init(|| async {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            fetch().await
        })
        .await
        .clone()
    }

    pub fn contains(&self, id: &ModuleRevisionId) -> bool {
        let cells = self
            .cells
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cells.get(id).is_some_and(|c| c.initialized())
    }

    /// Number of fetches actually run.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}
