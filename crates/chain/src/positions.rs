//! Position batch assembly from the cached feed and the lending ledger.
//!
//! A cycle's batch is built in three steps:
//! 1. the off-chain snapshot (possibly hours old),
//! 2. every ledger row touched in a tracking period since that snapshot,
//! 3. a fresh `viewPositionMetadata` read for each distinct tranche.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use tranche_core::{
    merge_positions, CachedPositionSet, EngineError, OnChainPositionRow, PositionSnapshot,
    PositionSource, SnapshotFeed, TokenMetadata,
};

use crate::contracts::IStableLending2;

/// Length of one ledger tracking period.
pub const TRACKING_PERIOD_SECS: u64 = 12 * 60 * 60;

/// Periods to re-read before the snapshot's own period.
const SNAPSHOT_LOOKBACK_PERIODS: u64 = 2;

/// Tracking periods to scan: from two periods before the snapshot up to the
/// period after the one `now` rounds to, end exclusive.
pub fn tracking_periods(snapshot_ms: u64, now_secs: u64) -> Range<u64> {
    let start = (snapshot_ms / 1000 / TRACKING_PERIOD_SECS).saturating_sub(SNAPSHOT_LOOKBACK_PERIODS);
    let end = 1 + (now_secs + TRACKING_PERIOD_SECS / 2) / TRACKING_PERIOD_SECS;
    start..end.max(start)
}

/// Replace a candidate with its refreshed ledger row, keeping the
/// candidate's tranche contract.
pub fn refreshed_snapshot(
    candidate: &PositionSnapshot,
    row: OnChainPositionRow,
) -> Result<PositionSnapshot, EngineError> {
    let mut snapshot = row.into_snapshot(candidate.collateral_decimals)?;
    if snapshot.tranche_id != candidate.tranche_id {
        return Err(EngineError::invalid_position(
            candidate.tranche_id,
            format!("ledger returned tranche {}", snapshot.tranche_id),
        ));
    }
    snapshot.tranche_contract = candidate.tranche_contract;
    Ok(snapshot)
}

pub struct StableLendingReader {
    rpc_url: String,
    lending: Address,
    feed: Arc<dyn SnapshotFeed>,
    metadata: Arc<dyn TokenMetadata>,
    read_concurrency: usize,
}

impl StableLendingReader {
    pub fn new(
        rpc_url: impl Into<String>,
        lending: Address,
        feed: Arc<dyn SnapshotFeed>,
        metadata: Arc<dyn TokenMetadata>,
        read_concurrency: usize,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            lending,
            feed,
            metadata,
            read_concurrency: read_concurrency.max(1),
        }
    }

    async fn snapshot(&self) -> CachedPositionSet {
        match self.feed.cached_positions().await {
            Ok(set) => set,
            Err(e) => {
                // Without a snapshot only the most recent periods are scanned
                warn!(error = %e, "Position feed unavailable, scanning recent periods only");
                CachedPositionSet {
                    timestamp_ms: Utc::now().timestamp_millis().max(0) as u64,
                    records: Vec::new(),
                }
            }
        }
    }

    async fn token_decimals(&self, tokens: impl IntoIterator<Item = Address>) -> HashMap<Address, u8> {
        let mut distinct: Vec<Address> = tokens.into_iter().collect();
        distinct.sort();
        distinct.dedup();

        let results = join_all(distinct.iter().map(|t| self.metadata.decimals(*t))).await;
        distinct
            .into_iter()
            .zip(results)
            .filter_map(|(token, result)| match result {
                Ok(decimals) => Some((token, decimals)),
                Err(e) => {
                    warn!(token = %token, error = %e, "Token decimals unavailable");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl PositionSource for StableLendingReader {
    #[instrument(skip(self), fields(ledger = %self.lending))]
    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>> {
        let started = Instant::now();
        let snapshot = self.snapshot().await;
        let now_secs = Utc::now().timestamp().max(0) as u64;
        let periods = tracking_periods(snapshot.timestamp_ms, now_secs);

        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let lending = IStableLending2::new(self.lending, &provider);

        let period_results: Vec<_> = stream::iter(periods.clone())
            .map(|period| {
                let lending = &lending;
                async move {
                    let rows = lending
                        .viewPositionsByTrackingPeriod(U256::from(period))
                        .call()
                        .await;
                    (period, rows)
                }
            })
            .buffered(self.read_concurrency)
            .collect()
            .await;

        let mut period_rows: Vec<OnChainPositionRow> = Vec::new();
        for (period, result) in period_results {
            match result {
                Ok(rows) => period_rows.extend(rows._0.into_iter().map(OnChainPositionRow::from)),
                Err(e) => warn!(period, error = %e, "Tracking period read failed"),
            }
        }

        let decimals = self
            .token_decimals(
                snapshot
                    .records
                    .iter()
                    .map(|r| r.token)
                    .chain(period_rows.iter().map(|r| r.token)),
            )
            .await;

        let mut candidates = Vec::with_capacity(snapshot.records.len() + period_rows.len());
        for record in snapshot.records {
            let Some(&dec) = decimals.get(&record.token) else { continue };
            match record.into_snapshot(dec) {
                Ok(position) => candidates.push(position),
                Err(e) => debug!(error = %e, "Skipping cached record"),
            }
        }
        for row in period_rows {
            let Some(&dec) = decimals.get(&row.token) else { continue };
            match row.into_snapshot(dec) {
                Ok(position) => candidates.push(position),
                Err(e) => debug!(error = %e, "Skipping ledger row"),
            }
        }
        let candidates = merge_positions(candidates);

        let refreshed: Vec<_> = stream::iter(candidates)
            .map(|candidate| {
                let lending = &lending;
                async move {
                    let row = lending
                        .viewPositionMetadata(U256::from(candidate.tranche_id))
                        .call()
                        .await;
                    (candidate, row)
                }
            })
            .buffered(self.read_concurrency)
            .collect()
            .await;

        let mut positions = Vec::with_capacity(refreshed.len());
        let mut stale = 0usize;
        for (candidate, result) in refreshed {
            match result {
                Ok(row) => match refreshed_snapshot(&candidate, row._0.into()) {
                    Ok(position) => positions.push(position),
                    Err(e) => debug!(error = %e, "Dropping tranche after refresh"),
                },
                Err(e) => {
                    warn!(tranche_id = candidate.tranche_id, error = %e, "Metadata refresh failed, using last known row");
                    stale += 1;
                    positions.push(candidate);
                }
            }
        }

        info!(
            periods = periods.end - periods.start,
            positions = positions.len(),
            stale,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Position batch assembled"
        );
        Ok(merge_positions(positions))
    }
}
