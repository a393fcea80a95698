//! Client for the published position snapshot.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use tranche_core::{CachedPositionRecord, CachedPositionSet, SnapshotFeed};

/// `{"tstamp": <ms>, "positions": {"<id>": {...}, ...}}`
#[derive(Debug, Deserialize)]
struct FeedDocument {
    tstamp: f64,
    #[serde(default)]
    positions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct PositionFeedClient {
    client: reqwest::Client,
    url: String,
}

impl PositionFeedClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// Decode a snapshot document. Malformed records are skipped.
pub fn parse_feed(body: &str) -> Result<CachedPositionSet> {
    let doc: FeedDocument = serde_json::from_str(body).context("Malformed position feed")?;

    let mut records = Vec::with_capacity(doc.positions.len());
    for (key, value) in doc.positions {
        match serde_json::from_value::<CachedPositionRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!(key = %key, error = %e, "Skipping malformed feed record"),
        }
    }

    Ok(CachedPositionSet {
        timestamp_ms: doc.tstamp.max(0.0) as u64,
        records,
    })
}

#[async_trait]
impl SnapshotFeed for PositionFeedClient {
    #[instrument(skip(self))]
    async fn cached_positions(&self) -> Result<CachedPositionSet> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Position feed error: {}", response.status());
        }
        let body = response.text().await?;
        debug!(bytes = body.len(), "Position feed downloaded");

        let set = parse_feed(&body)?;
        info!(
            records = set.records.len(),
            tstamp = set.timestamp_ms,
            "Cached positions loaded"
        );
        Ok(set)
    }
}
