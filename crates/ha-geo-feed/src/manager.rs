//! Poll cycle orchestration for one feed
//!
//! A cycle fetches the feed, processes the entries, diffs identifiers
//! against the previous cycle, persists the new baseline and then hands
//! everything to the publisher. Cycles of one manager never overlap.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ha_core::Context;
use ha_storage::{FeedStateStore, StorageResult};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{FeedConfig, DOMAIN};
use crate::entry::{FeedEntry, ProcessedEntry};
use crate::error::{EntryFailure, FeedError, FeedResult, FetchError, PublishError, SetupError};
use crate::geometry::ReferencePoint;
use crate::processor::FeedEntryProcessor;
use crate::tracker::{FeedLifecycleTracker, LifecycleDiff};

/// Source of raw feed entries
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError>;
}

/// Receiver of each successful cycle's results
///
/// Publishing runs after the new baseline is persisted, so an error here
/// does not roll the cycle back: the next cycle reports these entries as
/// updated. Implementations should fail before delivering anything rather
/// than part way through.
#[async_trait]
pub trait FeedPublisher: Send + Sync {
    async fn publish(&self, update: &FeedUpdate) -> Result<(), PublishError>;
}

/// Everything one cycle produced
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub feed_id: String,
    pub name: String,
    pub url: String,
    /// Shared by every event of the cycle
    pub context: Context,
    /// Retained entries in feed order
    pub entries: Vec<ProcessedEntry>,
    pub lifecycle: LifecycleDiff,
    pub include_attributes: Vec<String>,
}

impl FeedUpdate {
    pub fn entry(&self, external_id: &str) -> Option<&ProcessedEntry> {
        self.entries.iter().find(|e| e.external_id == external_id)
    }
}

/// Counts of a finished cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub retained: usize,
    pub lifecycle: LifecycleDiff,
    pub failures: Vec<EntryFailure>,
}

/// Where a manager is within its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ManagerPhase {
    Idle = 0,
    Fetching = 1,
    Filtering = 2,
    Publishing = 3,
}

impl ManagerPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ManagerPhase::Fetching,
            2 => ManagerPhase::Filtering,
            3 => ManagerPhase::Publishing,
            _ => ManagerPhase::Idle,
        }
    }
}

/// Drives poll cycles for one configured feed
pub struct FeedManager {
    config: FeedConfig,
    feed_id: String,
    processor: FeedEntryProcessor,
    fetcher: Arc<dyn FeedFetcher>,
    publisher: Arc<dyn FeedPublisher>,
    tracker: Mutex<FeedLifecycleTracker>,
    /// Entries retained by the last successful cycle
    entries: RwLock<Vec<ProcessedEntry>>,
    busy: AtomicBool,
    phase: AtomicU8,
}

/// Returns the manager to idle however the cycle ends
struct CycleGuard<'a>(&'a FeedManager);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.set_phase(ManagerPhase::Idle);
        self.0.busy.store(false, Ordering::Release);
    }
}

impl FeedManager {
    pub fn new(
        config: FeedConfig,
        processor: FeedEntryProcessor,
        tracker: FeedLifecycleTracker,
        fetcher: Arc<dyn FeedFetcher>,
        publisher: Arc<dyn FeedPublisher>,
    ) -> Self {
        Self {
            feed_id: tracker.feed_id().to_string(),
            config,
            processor,
            fetcher,
            publisher,
            tracker: Mutex::new(tracker),
            entries: RwLock::new(Vec::new()),
            busy: AtomicBool::new(false),
            phase: AtomicU8::new(ManagerPhase::Idle as u8),
        }
    }

    /// Build a manager from configuration
    ///
    /// Rules are compiled here. Without a store, lifecycle state lives in
    /// memory only.
    pub fn from_config(
        config: FeedConfig,
        home: ReferencePoint,
        store: Option<FeedStateStore>,
        fetcher: Arc<dyn FeedFetcher>,
        publisher: Arc<dyn FeedPublisher>,
    ) -> Result<Self, SetupError> {
        let processor = config.build_processor(config.reference_point(home))?;
        let feed_id = config.feed_id();
        let tracker = match store {
            Some(store) => FeedLifecycleTracker::with_store(feed_id, store),
            None => FeedLifecycleTracker::new(feed_id),
        };

        Ok(Self::new(config, processor, tracker, fetcher, publisher))
    }

    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn phase(&self) -> ManagerPhase {
        ManagerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn set_phase(&self, phase: ManagerPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Entries retained by the last successful cycle
    pub async fn entries(&self) -> Vec<ProcessedEntry> {
        self.entries.read().await.clone()
    }

    pub async fn get_entry(&self, external_id: &str) -> Option<ProcessedEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.external_id == external_id)
            .cloned()
    }

    /// Load the persisted baseline so the first cycle after a restart
    /// only reports real changes
    pub async fn restore(&self) -> StorageResult<()> {
        self.tracker.lock().await.restore().await
    }

    /// Run one poll cycle
    ///
    /// A fetch failure leaves the baseline and retained entries untouched
    /// and publishes nothing. A trigger arriving while a cycle runs is
    /// rejected with [`FeedError::CycleInProgress`].
    #[instrument(skip(self), fields(feed_id = %self.feed_id))]
    pub async fn update(&self) -> FeedResult<CycleOutcome> {
        if self.busy.swap(true, Ordering::AcqRel) {
            warn!("Update already in progress, skipping");
            return Err(FeedError::CycleInProgress(self.feed_id.clone()));
        }
        let _guard = CycleGuard(self);

        let context = Context::for_source(format!("{DOMAIN}.{}", self.feed_id));

        self.set_phase(ManagerPhase::Fetching);
        let raw = match self.fetcher.fetch(&self.config.url).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "Fetching feed failed");
                return Err(e.into());
            }
        };
        debug!(count = raw.len(), "Fetched feed entries");

        self.set_phase(ManagerPhase::Filtering);
        let report = self.processor.process(raw);
        let ids = report.external_ids();

        let lifecycle = {
            let mut tracker = self.tracker.lock().await;
            let lifecycle = tracker.diff(&ids);
            tracker.commit(&ids).await?;
            lifecycle
        };
        *self.entries.write().await = report.entries.clone();

        self.set_phase(ManagerPhase::Publishing);
        let update = FeedUpdate {
            feed_id: self.feed_id.clone(),
            name: self.config.name.clone(),
            url: self.config.url.clone(),
            context,
            entries: report.entries,
            lifecycle,
            include_attributes: self.config.include_attributes.clone(),
        };
        self.publisher.publish(&update).await?;

        info!(
            count = update.entries.len(),
            created = update.lifecycle.created.len(),
            updated = update.lifecycle.updated.len(),
            deleted = update.lifecycle.deleted.len(),
            failed = report.failures.len(),
            "Feed updated"
        );

        Ok(CycleOutcome {
            retained: update.entries.len(),
            lifecycle: update.lifecycle,
            failures: report.failures,
        })
    }
}
