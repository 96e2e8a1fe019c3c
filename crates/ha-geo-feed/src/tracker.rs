//! Entry lifecycle across poll cycles

use std::collections::{BTreeSet, HashSet};

use ha_storage::{FeedStateStore, StorageResult};
use tracing::debug;

/// Identifiers that appeared, persisted or disappeared between two cycles
///
/// `created` and `updated` follow feed order, `deleted` is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleDiff {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl LifecycleDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Classify identifiers against the previous cycle's set
///
/// Entries present in both cycles are reported as updated even when
/// nothing about them changed. Repeated identifiers count once.
pub fn diff(current: &[String], previous: &BTreeSet<String>) -> LifecycleDiff {
    let mut result = LifecycleDiff::default();
    let mut seen = HashSet::with_capacity(current.len());

    for id in current {
        if !seen.insert(id.as_str()) {
            continue;
        }
        if previous.contains(id) {
            result.updated.push(id.clone());
        } else {
            result.created.push(id.clone());
        }
    }

    result.deleted = previous
        .iter()
        .filter(|id| !seen.contains(id.as_str()))
        .cloned()
        .collect();

    result
}

/// Remembers the identifiers retained by the last successful cycle
///
/// With a store attached the set survives restarts; without one every
/// process start behaves like a first run.
#[derive(Debug)]
pub struct FeedLifecycleTracker {
    feed_id: String,
    store: Option<FeedStateStore>,
    previous: BTreeSet<String>,
}

impl FeedLifecycleTracker {
    /// In-memory tracker
    pub fn new(feed_id: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            store: None,
            previous: BTreeSet::new(),
        }
    }

    /// Tracker persisting through `store`
    pub fn with_store(feed_id: impl Into<String>, store: FeedStateStore) -> Self {
        Self {
            store: Some(store),
            ..Self::new(feed_id)
        }
    }

    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    pub fn previous(&self) -> &BTreeSet<String> {
        &self.previous
    }

    /// Load the persisted set, if any
    pub async fn restore(&mut self) -> StorageResult<()> {
        if let Some(store) = &self.store {
            if let Some(previous) = store.load(&self.feed_id).await? {
                debug!(feed_id = %self.feed_id, count = previous.len(), "Restored lifecycle state");
                self.previous = previous;
            }
        }
        Ok(())
    }

    /// Diff against the current cycle without recording it
    pub fn diff(&self, current: &[String]) -> LifecycleDiff {
        diff(current, &self.previous)
    }

    /// Record the current cycle as the new baseline
    ///
    /// The set is persisted first; on a storage error the in-memory
    /// baseline is left unchanged.
    pub async fn commit(&mut self, current: &[String]) -> StorageResult<()> {
        let current: BTreeSet<String> = current.iter().cloned().collect();
        if let Some(store) = &self.store {
            store.save(&self.feed_id, &current).await?;
        }
        self.previous = current;
        Ok(())
    }

    /// Drop the baseline, in memory and on disk
    pub async fn forget(&mut self) -> StorageResult<()> {
        if let Some(store) = &self.store {
            store.remove(&self.feed_id).await?;
        }
        self.previous.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_storage::Storage;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_classifies() {
        let result = diff(&ids(&["c", "a", "d"]), &set(&["a", "b"]));
        assert_eq!(result.created, ids(&["c", "d"]));
        assert_eq!(result.updated, ids(&["a"]));
        assert_eq!(result.deleted, ids(&["b"]));
    }

    #[test]
    fn test_diff_first_run_creates_everything() {
        let result = diff(&ids(&["1", "2"]), &BTreeSet::new());
        assert_eq!(result.created, ids(&["1", "2"]));
        assert!(result.updated.is_empty());
        assert!(result.deleted.is_empty());
    }

    #[test]
    fn test_diff_unchanged_feed_updates_everything() {
        let result = diff(&ids(&["1", "2"]), &set(&["1", "2"]));
        assert!(result.created.is_empty());
        assert_eq!(result.updated, ids(&["1", "2"]));
        assert!(result.deleted.is_empty());
    }

    #[test]
    fn test_diff_empty_feed_deletes_everything() {
        let result = diff(&[], &set(&["2", "1"]));
        assert_eq!(result.deleted, ids(&["1", "2"]));
        assert!(result.created.is_empty() && result.updated.is_empty());
        assert!(diff(&[], &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_diff_counts_repeats_once() {
        let result = diff(&ids(&["1", "1", "2"]), &set(&["2"]));
        assert_eq!(result.created, ids(&["1"]));
        assert_eq!(result.updated, ids(&["2"]));
    }

    #[tokio::test]
    async fn test_tracker_in_memory_cycle() {
        let mut tracker = FeedLifecycleTracker::new("feed");
        assert_eq!(tracker.diff(&ids(&["1"])).created, ids(&["1"]));

        tracker.commit(&ids(&["1"])).await.unwrap();
        let next = tracker.diff(&ids(&["2"]));
        assert_eq!(next.created, ids(&["2"]));
        assert_eq!(next.deleted, ids(&["1"]));
    }

    #[tokio::test]
    async fn test_tracker_survives_restart() {
        let temp = TempDir::new().unwrap();
        let store = FeedStateStore::new(Arc::new(Storage::new(temp.path())));

        let mut tracker = FeedLifecycleTracker::with_store("feed", store.clone());
        tracker.restore().await.unwrap();
        tracker.commit(&ids(&["1", "2"])).await.unwrap();

        let mut restarted = FeedLifecycleTracker::with_store("feed", store.clone());
        restarted.restore().await.unwrap();
        assert_eq!(restarted.previous(), &set(&["1", "2"]));
        assert_eq!(restarted.diff(&ids(&["2"])).deleted, ids(&["1"]));

        restarted.forget().await.unwrap();
        assert!(restarted.previous().is_empty());
        assert_eq!(store.load("feed").await.unwrap(), None);
    }
}
