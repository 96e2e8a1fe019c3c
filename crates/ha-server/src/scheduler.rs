//! Periodic polling of feed managers
//!
//! Each manager gets its own task ticking at the feed's scan interval.
//! Missed ticks are skipped rather than bunched up, and a cycle still
//! running when the next tick arrives is rejected by the manager itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use ha_geo_feed::{FeedError, FeedManager};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Drives every configured feed on its own interval
pub struct FeedScheduler {
    managers: Vec<Arc<FeedManager>>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedScheduler {
    pub fn new(managers: Vec<Arc<FeedManager>>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            managers,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn managers(&self) -> &[Arc<FeedManager>] {
        &self.managers
    }

    /// Run one cycle of every feed concurrently
    ///
    /// Returns how many cycles succeeded.
    pub async fn refresh_all(&self) -> usize {
        let results = join_all(self.managers.iter().map(|m| m.update())).await;

        let mut succeeded = 0;
        for (manager, result) in self.managers.iter().zip(results) {
            match result {
                Ok(_) => succeeded += 1,
                Err(FeedError::CycleInProgress(_)) => {}
                Err(e) => warn!(feed_id = manager.feed_id(), error = %e, "Feed update failed"),
            }
        }
        succeeded
    }

    /// Start polling; the first scheduled cycle runs one interval from now
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Feed scheduler already running");
            return;
        }

        info!("Starting feed scheduler for {} feed(s)", self.managers.len());
        let mut tasks = self.tasks.lock().await;

        for manager in &self.managers {
            let manager = manager.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let period = manager.config().scan_interval;

            tasks.push(tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            match manager.update().await {
                                Ok(outcome) => debug!(
                                    feed_id = manager.feed_id(),
                                    count = outcome.retained,
                                    "Scheduled update finished"
                                ),
                                Err(FeedError::CycleInProgress(_)) => {}
                                Err(e) => error!(
                                    feed_id = manager.feed_id(),
                                    error = %e,
                                    "Scheduled update failed"
                                ),
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            debug!(feed_id = manager.feed_id(), "Polling stopped");
                            break;
                        }
                    }
                }
            }));
        }
    }

    /// Stop polling and wait for the tasks to finish
    pub async fn stop(&self) {
        if !self.is_running() {
            return;
        }

        info!("Stopping feed scheduler");
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Polling task panicked");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ha_geo_feed::{
        FeedConfig, FeedEntry, FeedFetcher, FeedPublisher, FeedUpdate, FetchError, PublishError,
        ReferencePoint,
    };

    struct EmptyFetcher;

    #[async_trait]
    impl FeedFetcher for EmptyFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError> {
            if url.contains("broken") {
                return Err(FetchError::new(url, "unreachable"));
            }
            Ok(Vec::new())
        }
    }

    struct NullPublisher;

    #[async_trait]
    impl FeedPublisher for NullPublisher {
        async fn publish(&self, _update: &FeedUpdate) -> Result<(), PublishError> {
            Ok(())
        }
    }

    fn manager(name: &str, url: &str) -> Arc<FeedManager> {
        let mut config = FeedConfig::new(url);
        config.name = name.to_string();
        Arc::new(
            FeedManager::from_config(
                config,
                ReferencePoint::new(0.0, 0.0),
                None,
                Arc::new(EmptyFetcher),
                Arc::new(NullPublisher),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_refresh_all_counts_successes() {
        let scheduler = FeedScheduler::new(vec![
            manager("Feed 1", "http://feed.example.com/1"),
            manager("Feed 2", "http://broken.example.com/2"),
        ]);
        assert_eq!(scheduler.refresh_all().await, 1);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let scheduler = FeedScheduler::new(vec![manager("Feed 1", "http://feed.example.com/1")]);
        assert!(!scheduler.is_running());

        scheduler.start().await;
        assert!(scheduler.is_running());

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        assert!(scheduler.tasks.lock().await.is_empty());
    }
}
