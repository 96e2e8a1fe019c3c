//! Last-seen entry identifiers per feed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Key prefix for feed state files; the feed id is appended
pub const FEED_STATE_KEY_PREFIX: &str = "geo_rss_events.";

/// Persisted state of one feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedStateData {
    /// Feed identifier this state belongs to
    pub feed_id: String,
    /// Entry identifiers retained by the last successful cycle
    pub last_seen: BTreeSet<String>,
    /// When the last successful cycle finished
    pub updated_at: DateTime<Utc>,
}

impl Storable for FeedStateData {
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

/// Durable map from feed identifier to its last-seen identifier set
#[derive(Debug, Clone)]
pub struct FeedStateStore {
    storage: Arc<Storage>,
}

impl FeedStateStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    fn key(feed_id: &str) -> String {
        format!("{}{}", FEED_STATE_KEY_PREFIX, feed_id)
    }

    /// Load the last-seen identifiers of a feed, `None` on first run
    pub async fn load(&self, feed_id: &str) -> StorageResult<Option<BTreeSet<String>>> {
        let state = self.storage.load_data::<FeedStateData>(&Self::key(feed_id)).await?;
        if let Some(state) = &state {
            debug!(
                feed_id,
                count = state.last_seen.len(),
                "Restored last-seen entries"
            );
        }
        Ok(state.map(|s| s.last_seen))
    }

    /// Replace the last-seen identifiers of a feed
    pub async fn save(&self, feed_id: &str, last_seen: &BTreeSet<String>) -> StorageResult<()> {
        let state = FeedStateData {
            feed_id: feed_id.to_string(),
            last_seen: last_seen.clone(),
            updated_at: Utc::now(),
        };
        self.storage.save_data(&Self::key(feed_id), &state).await
    }

    /// Forget a feed entirely
    pub async fn remove(&self, feed_id: &str) -> StorageResult<()> {
        self.storage.delete(&Self::key(feed_id)).await
    }

    /// Feed identifiers that have persisted state
    pub async fn known_feeds(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .storage
            .list_keys(FEED_STATE_KEY_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(FEED_STATE_KEY_PREFIX).map(str::to_string))
            .collect())
    }

    /// Remove persisted state of feeds that are no longer configured
    pub async fn prune(&self, configured: &[String]) -> StorageResult<usize> {
        let mut removed = 0;
        for feed_id in self.known_feeds().await? {
            if !configured.contains(&feed_id) {
                self.remove(&feed_id).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed state of {} unconfigured feed(s)", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn store(dir: &TempDir) -> FeedStateStore {
        FeedStateStore::new(Arc::new(Storage::new(dir.path())))
    }

    #[tokio::test]
    async fn test_first_run_has_no_state() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).load("name_1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();
        store(&dir)
            .save("name_1", &ids(&["guid-1", "guid-2"]))
            .await
            .unwrap();

        let restored = store(&dir).load("name_1").await.unwrap();
        assert_eq!(restored, Some(ids(&["guid-1", "guid-2"])));
    }

    #[tokio::test]
    async fn test_feeds_are_isolated() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save("feed_a", &ids(&["a"])).await.unwrap();
        store.save("feed_b", &ids(&["b"])).await.unwrap();

        assert_eq!(store.load("feed_a").await.unwrap(), Some(ids(&["a"])));
        assert_eq!(store.known_feeds().await.unwrap(), vec!["feed_a", "feed_b"]);
    }

    #[tokio::test]
    async fn test_prune_unconfigured() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save("keep", &ids(&["a"])).await.unwrap();
        store.save("stale", &ids(&["b"])).await.unwrap();

        let removed = store.prune(&["keep".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.known_feeds().await.unwrap(), vec!["keep"]);
    }
}
