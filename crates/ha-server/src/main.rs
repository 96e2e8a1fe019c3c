//! Geo feed service
//!
//! Polls the feeds configured under `geo_rss_events:` in
//! `configuration.yaml`, publishes entry lifecycle events on the event bus
//! and keeps summary sensors and map entities current.

mod fetcher;
mod georss;
mod scheduler;
mod sensors;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use ha_config::{load_yaml, CoreConfig};
use ha_core::{events, Context, Event};
use ha_event_bus::EventBus;
use ha_geo_feed::{
    EventBusPublisher, FanoutPublisher, FeedConfig, FeedManager, GeoLocationRegistry,
    ReferencePoint,
};
use ha_storage::{FeedStateStore, Storage};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::fetcher::HttpFeedFetcher;
use crate::scheduler::FeedScheduler;
use crate::sensors::SensorMonitor;

const CONFIG_FILE: &str = "configuration.yaml";
const CONFIG_DIR_ENV: &str = "GEO_FEEDS_CONFIG";

/// The running service
pub struct GeoFeeds {
    /// Event bus for pub/sub communication
    pub bus: Arc<EventBus>,
    /// Map entities of every feed
    pub geo_locations: Arc<GeoLocationRegistry>,
    pub scheduler: FeedScheduler,
    feeds: Vec<FeedConfig>,
}

impl GeoFeeds {
    /// Load configuration and build one manager per feed
    pub async fn setup(config_dir: &Path) -> Result<Self> {
        let yaml = load_yaml(config_dir, CONFIG_FILE)
            .with_context(|| format!("loading {}", config_dir.join(CONFIG_FILE).display()))?;
        let core = CoreConfig::from_yaml(&yaml)?;
        let feeds = FeedConfig::list_from_yaml(&yaml)?;
        if feeds.is_empty() {
            warn!("No feeds configured under geo_rss_events");
        }

        let storage = Arc::new(Storage::new(config_dir));
        let store = FeedStateStore::new(storage);
        let feed_ids: Vec<String> = feeds.iter().map(FeedConfig::feed_id).collect();
        store.prune(&feed_ids).await?;

        let bus = Arc::new(EventBus::new());
        let geo_locations = Arc::new(GeoLocationRegistry::new());
        let fetcher = Arc::new(HttpFeedFetcher::new()?);
        let publisher = Arc::new(
            FanoutPublisher::new()
                .with(Arc::new(EventBusPublisher::new(bus.clone())))
                .with(geo_locations.clone()),
        );

        let (latitude, longitude) = core.coordinates();
        let home = ReferencePoint::new(latitude, longitude);

        let mut managers = Vec::with_capacity(feeds.len());
        for feed in &feeds {
            let manager = FeedManager::from_config(
                feed.clone(),
                home,
                Some(store.clone()),
                fetcher.clone(),
                publisher.clone(),
            )
            .with_context(|| format!("setting up feed '{}'", feed.name))?;
            manager.restore().await?;

            info!(
                feed_id = manager.feed_id(),
                url = %feed.url,
                radius = feed.radius,
                "Feed configured"
            );
            managers.push(Arc::new(manager));
        }

        Ok(Self {
            bus,
            geo_locations,
            scheduler: FeedScheduler::new(managers),
            feeds,
        })
    }

    pub fn feeds(&self) -> &[FeedConfig] {
        &self.feeds
    }
}

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_DIR_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_dir = config_dir();
    info!("Starting geo feed service (config: {})", config_dir.display());

    let app = GeoFeeds::setup(&config_dir).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let monitor = SensorMonitor::new(app.feeds())?.spawn(&app.bus, shutdown_tx.subscribe());

    app.bus.fire(Event::new(
        events::HOMEASSISTANT_START,
        serde_json::Value::Null,
        Context::new(),
    ));

    let refreshed = app.scheduler.refresh_all().await;
    info!(
        "Initial update finished for {}/{} feed(s), {} map entities",
        refreshed,
        app.scheduler.managers().len(),
        app.geo_locations.len().await
    );
    app.scheduler.start().await;

    info!("Geo feed service is running");

    // Keep the service running
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    app.scheduler.stop().await;
    app.bus.fire(Event::new(
        events::HOMEASSISTANT_STOP,
        serde_json::Value::Null,
        Context::new(),
    ));
    let _ = shutdown_tx.send(());
    if let Err(e) = monitor.await {
        warn!(error = %e, "Sensor monitor ended abnormally");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_setup_builds_managers_and_prunes_state() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE),
            r#"
homeassistant:
  latitude: -33.865
  longitude: 151.209444
geo_rss_events:
  - name: Name 1
    url: http://feed.example.com/1
  - name: Name 2
    url: http://feed.example.com/2
    radius: 50
"#,
        )
        .unwrap();

        let stale = FeedStateStore::new(Arc::new(Storage::new(temp.path())));
        stale
            .save("removed_feed", &["x".to_string()].into_iter().collect())
            .await
            .unwrap();

        let app = GeoFeeds::setup(temp.path()).await.unwrap();
        let ids: Vec<&str> = app.scheduler.managers().iter().map(|m| m.feed_id()).collect();
        assert_eq!(ids, ["name_1", "name_2"]);
        assert_eq!(app.feeds()[1].radius, 50.0);
        assert!(stale.known_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_setup_rejects_bad_rules() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE),
            "geo_rss_events:\n  url: http://feed.example.com\n  filters:\n    - attribute: title\n      regexp: '('\n",
        )
        .unwrap();

        assert!(GeoFeeds::setup(temp.path()).await.is_err());
    }
}
