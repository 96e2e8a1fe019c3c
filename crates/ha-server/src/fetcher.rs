//! Feed fetching over HTTP
//!
//! One fetcher serves both feed formats: GeoJSON `FeatureCollection`s
//! and GeoRSS (RSS or Atom). The format follows the response content type,
//! falling back to the first byte of the body.

use std::time::Duration;

use async_trait::async_trait;
use ha_geo_feed::{FeedEntry, FeedFetcher, FetchError};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;

use crate::georss::parse_georss;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    GeoJson,
    GeoRss,
}

impl FeedFormat {
    pub fn detect(content_type: Option<&str>, body: &[u8]) -> Self {
        if let Some(content_type) = content_type {
            let content_type = content_type.to_ascii_lowercase();
            if content_type.contains("json") {
                return FeedFormat::GeoJson;
            }
            if content_type.contains("xml") {
                return FeedFormat::GeoRss;
            }
        }
        match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => FeedFormat::GeoJson,
            _ => FeedFormat::GeoRss,
        }
    }
}

/// Fetches GeoJSON and GeoRSS feeds
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("geo-feeds/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

/// Entries of a fetched body in the given format
pub fn parse_body(format: FeedFormat, body: &[u8]) -> Result<Vec<FeedEntry>, String> {
    match format {
        FeedFormat::GeoJson => {
            let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
            parse_feature_collection(&value)
        }
        FeedFormat::GeoRss => parse_georss(body),
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::new(url, e))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| FetchError::new(url, e))?;

        let format = FeedFormat::detect(content_type.as_deref(), &body);
        let entries = parse_body(format, &body).map_err(|e| FetchError::new(url, e))?;
        debug!(url, ?format, count = entries.len(), "Fetched feed");
        Ok(entries)
    }
}

/// Entries of a `FeatureCollection`; members that are not features are
/// skipped
pub fn parse_feature_collection(body: &Value) -> Result<Vec<FeedEntry>, String> {
    if body.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err("response is not a GeoJSON FeatureCollection".to_string());
    }
    let features = body
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| "FeatureCollection has no features array".to_string())?;

    Ok(features
        .iter()
        .filter_map(FeedEntry::from_geojson_feature)
        .collect())
}
