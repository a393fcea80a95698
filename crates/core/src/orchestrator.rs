//! One evaluation cycle over the current batch of positions.
//!
//! Order of operations:
//! 1. Fetch positions (failure aborts the cycle; the poll loop retries)
//! 2. Quote every distinct collateral token from both sources, concurrently
//! 3. Correct lagging oracle prices, one token at a time
//! 4. Evaluate every position against its token's reference quote
//! 5. Size, fund-check and submit liquidatable positions sequentially
//!
//! Errors from steps 2-5 are scoped to a token or tranche and recorded in the
//! [`CycleReport`]; they never abort the batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use smallvec::SmallVec;
use tracing::{debug, info, instrument, warn};

use crate::bid_sizer::{BidSizer, SizingParams};
use crate::collaborators::{
    BidTargetQuoter, FundingSource, LiquidationSubmitter, OracleUpdater, PositionSource, PriceSources,
};
use crate::config::EngineConfig;
use crate::eligibility::{EligibilityEvaluator, Ineligibility, LiquidationDecision};
use crate::error::EngineError;
use crate::execution::{ExecutionGate, ExecutionOutcome, ExecutionResult};
use crate::position::{PositionSnapshot, TrancheId};
use crate::price::{PriceQuote, PriceReconciler, PriceSource, ReferenceSource, TokenPrices};

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub positions: Arc<dyn PositionSource>,
    pub prices: PriceSources,
    pub oracle: Arc<dyn OracleUpdater>,
    pub bid_targets: Arc<dyn BidTargetQuoter>,
    pub funding: Arc<dyn FundingSource>,
    pub submitter: Arc<dyn LiquidationSubmitter>,
}

/// What a recorded error was scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Token(Address),
    Tranche(TrancheId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub scope: ErrorScope,
    pub error: EngineError,
}

/// Summary of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub positions_evaluated: usize,
    pub tokens_quoted: usize,
    pub tokens_corrected: Vec<Address>,
    pub decisions: Vec<LiquidationDecision>,
    pub executions: Vec<ExecutionResult>,
    pub errors: Vec<CycleError>,
    pub elapsed_ms: u128,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            positions_evaluated: 0,
            tokens_quoted: 0,
            tokens_corrected: Vec::new(),
            decisions: Vec::new(),
            executions: Vec::new(),
            errors: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn liquidatable(&self) -> impl Iterator<Item = &LiquidationDecision> {
        self.decisions.iter().filter(|d| d.is_liquidatable)
    }

    pub fn count_outcome(&self, outcome: ExecutionOutcome) -> usize {
        self.executions.iter().filter(|r| r.outcome == outcome).count()
    }

    fn record(&mut self, scope: ErrorScope, error: EngineError) {
        self.errors.push(CycleError { scope, error });
    }

    pub fn log_summary(&self) {
        let unpriced = self
            .decisions
            .iter()
            .filter(|d| d.ineligibility == Some(Ineligibility::PriceUnavailable))
            .count();
        info!(
            positions = self.positions_evaluated,
            tokens = self.tokens_quoted,
            corrected = self.tokens_corrected.len(),
            liquidatable = self.liquidatable().count(),
            unpriced,
            submitted = self.count_outcome(ExecutionOutcome::Submitted),
            skipped_funds = self.count_outcome(ExecutionOutcome::SkippedInsufficientFunds),
            failed = self.count_outcome(ExecutionOutcome::Failed),
            simulated = self.count_outcome(ExecutionOutcome::Simulated),
            errors = self.errors.len(),
            elapsed_ms = self.elapsed_ms,
            "Cycle complete"
        );
    }
}

pub struct LiquidationOrchestrator {
    positions: Arc<dyn PositionSource>,
    prices: PriceSources,
    oracle: Arc<dyn OracleUpdater>,
    funding: Arc<dyn FundingSource>,
    reconciler: PriceReconciler,
    reference_source: ReferenceSource,
    corrections_enabled: bool,
    evaluator: EligibilityEvaluator,
    sizer: BidSizer,
    gate: ExecutionGate,
}

impl LiquidationOrchestrator {
    pub fn new(collaborators: Collaborators, config: &EngineConfig) -> Self {
        let recipient = collaborators.submitter.settlement_account();
        Self {
            positions: collaborators.positions,
            prices: collaborators.prices,
            oracle: collaborators.oracle,
            funding: collaborators.funding,
            reconciler: PriceReconciler::new(config.reconciliation.tolerance_bps),
            reference_source: config.reconciliation.reference_source,
            corrections_enabled: config.reconciliation.corrections_enabled,
            evaluator: EligibilityEvaluator::from_config(&config.eligibility),
            sizer: BidSizer::new(
                SizingParams::from(&config.sizing),
                collaborators.bid_targets,
                recipient,
            ),
            gate: ExecutionGate::new(collaborators.submitter, config.execution.dry_run),
        }
    }

    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        let start = Instant::now();
        let now = Utc::now();
        let mut report = CycleReport::new(now);

        let positions = self
            .positions
            .get_positions()
            .await
            .map_err(|e| EngineError::transport("get positions", e))?;
        report.positions_evaluated = positions.len();

        let tokens = distinct_tokens(&positions);
        report.tokens_quoted = tokens.len();
        debug!(positions = positions.len(), tokens = tokens.len(), "Positions loaded");

        let mut quotes = self.quote_tokens(&tokens, &mut report).await;
        self.reconcile(&mut quotes, &mut report).await;

        let mut liquidatable: Vec<(&PositionSnapshot, PriceQuote)> = Vec::new();
        for position in &positions {
            let reference = quotes
                .get(&position.token)
                .map(|p| p.reference(self.reference_source).clone())
                .unwrap_or_else(|| PriceQuote::unavailable(position.token, PriceSource::ExternalMarket));

            let decision = self.evaluator.evaluate(position, &reference, now);
            if decision.is_liquidatable {
                info!(
                    tranche_id = decision.tranche_id,
                    price = reference.usd_f64(),
                    liquidation_price = decision.liquidation_price_f64(),
                    debt_ratio = decision.debt_ratio_f64(),
                    "Position liquidatable"
                );
                liquidatable.push((position, reference));
            }
            report.decisions.push(decision);
        }

        for (position, reference) in liquidatable {
            if let Some(result) = self.liquidate(position, &reference, &mut report).await {
                report.executions.push(result);
            }
        }

        report.elapsed_ms = start.elapsed().as_millis();
        Ok(report)
    }

    /// On-chain and market quotes for every token, all in flight at once.
    async fn quote_tokens(&self, tokens: &[Address], report: &mut CycleReport) -> HashMap<Address, TokenPrices> {
        let fetches = tokens.iter().map(|&token| async move {
            let (on_chain, market) = futures::join!(
                self.prices.get_price(token, PriceSource::OnChainOracle),
                self.prices.get_price(token, PriceSource::ExternalMarket),
            );
            (token, on_chain, market)
        });

        let mut prices = HashMap::with_capacity(tokens.len());
        for (token, on_chain, market) in join_all(fetches).await {
            let on_chain = self.quote_or_unavailable(token, PriceSource::OnChainOracle, on_chain, report);
            let market = self.quote_or_unavailable(token, PriceSource::ExternalMarket, market, report);
            debug!(
                token = %token,
                on_chain = on_chain.usd_f64(),
                market = market.usd_f64(),
                "Token quoted"
            );
            prices.insert(token, TokenPrices { on_chain, market });
        }
        prices
    }

    fn quote_or_unavailable(
        &self,
        token: Address,
        source: PriceSource,
        result: anyhow::Result<PriceQuote>,
        report: &mut CycleReport,
    ) -> PriceQuote {
        match result {
            Ok(quote) => quote,
            Err(e) => {
                let operation = match source {
                    PriceSource::OnChainOracle => "on-chain price",
                    PriceSource::ExternalMarket => "market price",
                };
                let err = EngineError::transport(operation, e);
                warn!(token = %token, error = %err, "Price fetch failed");
                report.record(ErrorScope::Token(token), err);
                PriceQuote::unavailable(token, source)
            }
        }
    }

    /// Sequential: each correction is a signed transaction.
    async fn reconcile(&self, quotes: &mut HashMap<Address, TokenPrices>, report: &mut CycleReport) {
        if !self.corrections_enabled {
            return;
        }

        let mut lagging: SmallVec<[Address; 8]> = quotes
            .iter()
            .filter(|(_, p)| self.reconciler.needs_correction(&p.on_chain, &p.market))
            .map(|(token, _)| *token)
            .collect();
        lagging.sort();

        for token in lagging {
            let Some(entry) = quotes.get_mut(&token) else {
                continue;
            };
            info!(
                token = %token,
                on_chain = entry.on_chain.usd_f64(),
                market = entry.market.usd_f64(),
                tolerance_bps = self.reconciler.tolerance_bps(),
                "Oracle price lags market, requesting update"
            );

            match self.oracle.request_update(token).await {
                Ok(tx_hash) => {
                    info!(token = %token, tx = %tx_hash, "Oracle update confirmed");
                    report.tokens_corrected.push(token);
                    if self.reference_source == ReferenceSource::OnChain {
                        match self.prices.get_price(token, PriceSource::OnChainOracle).await {
                            Ok(quote) => entry.on_chain = quote,
                            Err(e) => {
                                let err = EngineError::transport("on-chain price", e);
                                warn!(token = %token, error = %err, "Re-read after correction failed");
                                report.record(ErrorScope::Token(token), err);
                            }
                        }
                    }
                }
                Err(e) => {
                    let err = EngineError::transport("oracle update", e);
                    warn!(token = %token, error = %err, "Oracle update failed");
                    report.record(ErrorScope::Token(token), err);
                }
            }
        }
    }

    #[instrument(skip_all, fields(tranche_id = position.tranche_id))]
    async fn liquidate(
        &self,
        position: &PositionSnapshot,
        reference: &PriceQuote,
        report: &mut CycleReport,
    ) -> Option<ExecutionResult> {
        let tranche_id = position.tranche_id;

        let plan = match self.sizer.size(position, reference).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, "Sizing failed");
                report.record(ErrorScope::Tranche(tranche_id), err);
                return None;
            }
        };

        // Re-read each time: an earlier submission may have spent it.
        let available = match self.funding.available_funding().await {
            Ok(v) => v,
            Err(e) => {
                let err = EngineError::transport("available funding", e);
                warn!(error = %err, "Funding read failed");
                report.record(ErrorScope::Tranche(tranche_id), err);
                return None;
            }
        };

        Some(self.gate.execute(&plan, available).await)
    }
}

/// Distinct collateral tokens in first-seen order.
fn distinct_tokens(positions: &[PositionSnapshot]) -> SmallVec<[Address; 8]> {
    let mut tokens: SmallVec<[Address; 8]> = SmallVec::new();
    for position in positions {
        if !tokens.contains(&position.token) {
            tokens.push(position.token);
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::PriceFeed;
    use crate::position::fixtures::position;
    use crate::u256_math::WAD;
    use alloy::primitives::{B256, U256};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    const TOKEN_A: Address = Address::new([0xaa; 20]);
    const TOKEN_B: Address = Address::new([0xbb; 20]);

    fn usd_cents(cents: u64) -> U256 {
        U256::from(cents) * WAD / U256::from(100u64)
    }

    struct MockPositions {
        positions: Vec<PositionSnapshot>,
        fail: bool,
    }

    #[async_trait]
    impl PositionSource for MockPositions {
        async fn get_positions(&self) -> anyhow::Result<Vec<PositionSnapshot>> {
            if self.fail {
                anyhow::bail!("rpc unavailable");
            }
            Ok(self.positions.clone())
        }
    }

    struct MockFeed {
        source: PriceSource,
        prices: Mutex<HashMap<Address, U256>>,
        failing: HashSet<Address>,
        calls: Mutex<usize>,
    }

    impl MockFeed {
        fn new(source: PriceSource, prices: &[(Address, U256)]) -> Arc<Self> {
            Arc::new(Self {
                source,
                prices: Mutex::new(prices.iter().copied().collect()),
                failing: HashSet::new(),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl PriceFeed for MockFeed {
        fn source(&self) -> PriceSource {
            self.source
        }

        async fn get_price(&self, token: Address) -> anyhow::Result<PriceQuote> {
            *self.calls.lock() += 1;
            if self.failing.contains(&token) {
                anyhow::bail!("429 too many requests");
            }
            let value = self.prices.lock().get(&token).copied().unwrap_or_default();
            Ok(PriceQuote::new(token, self.source, value))
        }
    }

    /// Writes the market price into the on-chain feed when asked.
    struct MockOracle {
        on_chain: Arc<MockFeed>,
        market: Arc<MockFeed>,
        fail: bool,
        updates: Mutex<Vec<Address>>,
    }

    #[async_trait]
    impl OracleUpdater for MockOracle {
        async fn request_update(&self, token: Address) -> anyhow::Result<B256> {
            self.updates.lock().push(token);
            if self.fail {
                anyhow::bail!("transaction reverted");
            }
            let market = self.market.prices.lock().get(&token).copied().unwrap_or_default();
            self.on_chain.prices.lock().insert(token, market);
            Ok(B256::repeat_byte(0x0c))
        }
    }

    struct MockQuoter;

    #[async_trait]
    impl BidTargetQuoter for MockQuoter {
        async fn query_bid_target(&self, _tranche_id: TrancheId, requested: U256) -> anyhow::Result<U256> {
            Ok(requested)
        }
    }

    struct MockFunding {
        balance: Mutex<U256>,
        reads: Mutex<usize>,
    }

    impl MockFunding {
        fn spend(&self, amount: U256) {
            let mut balance = self.balance.lock();
            *balance = balance.saturating_sub(amount);
        }
    }

    #[async_trait]
    impl FundingSource for MockFunding {
        async fn available_funding(&self) -> anyhow::Result<U256> {
            *self.reads.lock() += 1;
            Ok(*self.balance.lock())
        }
    }

    /// Successful submissions spend the bid from the funding balance.
    struct MockSubmitter {
        funding: Arc<MockFunding>,
        failing: HashSet<TrancheId>,
        calls: Mutex<Vec<TrancheId>>,
    }

    #[async_trait]
    impl LiquidationSubmitter for MockSubmitter {
        fn settlement_account(&self) -> Address {
            Address::repeat_byte(0xee)
        }

        async fn submit_liquidation(
            &self,
            tranche_id: TrancheId,
            _collateral_requested: U256,
            rebalancing_bid: U256,
            recipient: Address,
        ) -> anyhow::Result<B256> {
            assert_eq!(recipient, Address::repeat_byte(0xee));
            self.calls.lock().push(tranche_id);
            if self.failing.contains(&tranche_id) {
                anyhow::bail!("replacement transaction underpriced");
            }
            self.funding.spend(rebalancing_bid);
            Ok(B256::repeat_byte(tranche_id as u8))
        }
    }

    struct Harness {
        on_chain: Arc<MockFeed>,
        market: Arc<MockFeed>,
        oracle: Arc<MockOracle>,
        funding: Arc<MockFunding>,
        submitter: Arc<MockSubmitter>,
        positions: Vec<PositionSnapshot>,
        fail_positions: bool,
        failing_tranches: HashSet<TrancheId>,
        fail_oracle: bool,
        available: U256,
    }

    impl Harness {
        fn new(positions: Vec<PositionSnapshot>) -> Self {
            let on_chain = MockFeed::new(PriceSource::OnChainOracle, &[(TOKEN_A, WAD), (TOKEN_B, WAD)]);
            let market = MockFeed::new(PriceSource::ExternalMarket, &[(TOKEN_A, WAD), (TOKEN_B, WAD)]);
            Self::with_feeds(positions, on_chain, market)
        }

        fn with_feeds(positions: Vec<PositionSnapshot>, on_chain: Arc<MockFeed>, market: Arc<MockFeed>) -> Self {
            let oracle = Arc::new(MockOracle {
                on_chain: on_chain.clone(),
                market: market.clone(),
                fail: false,
                updates: Mutex::new(Vec::new()),
            });
            let funding = Arc::new(MockFunding {
                balance: Mutex::new(U256::ZERO),
                reads: Mutex::new(0),
            });
            Self {
                on_chain,
                market,
                oracle,
                submitter: Arc::new(MockSubmitter {
                    funding: funding.clone(),
                    failing: HashSet::new(),
                    calls: Mutex::new(Vec::new()),
                }),
                funding,
                positions,
                fail_positions: false,
                failing_tranches: HashSet::new(),
                fail_oracle: false,
                available: U256::from(1_000_000u64) * WAD,
            }
        }

        fn build(&mut self, config: &EngineConfig) -> LiquidationOrchestrator {
            self.oracle = Arc::new(MockOracle {
                on_chain: self.on_chain.clone(),
                market: self.market.clone(),
                fail: self.fail_oracle,
                updates: Mutex::new(Vec::new()),
            });
            self.funding = Arc::new(MockFunding {
                balance: Mutex::new(self.available),
                reads: Mutex::new(0),
            });
            self.submitter = Arc::new(MockSubmitter {
                funding: self.funding.clone(),
                failing: self.failing_tranches.clone(),
                calls: Mutex::new(Vec::new()),
            });
            let collaborators = Collaborators {
                positions: Arc::new(MockPositions {
                    positions: self.positions.clone(),
                    fail: self.fail_positions,
                }),
                prices: PriceSources::new(self.on_chain.clone(), self.market.clone()),
                oracle: self.oracle.clone(),
                bid_targets: Arc::new(MockQuoter),
                funding: self.funding.clone(),
                submitter: self.submitter.clone(),
            };
            LiquidationOrchestrator::new(collaborators, config)
        }
    }

    fn underwater(tranche_id: TrancheId, token: Address) -> PositionSnapshot {
        let mut p = position(tranche_id, 1000, 1000, 900, 8000);
        p.token = token;
        p
    }

    fn healthy(tranche_id: TrancheId, token: Address) -> PositionSnapshot {
        let mut p = position(tranche_id, 1000, 1000, 500, 8000);
        p.token = token;
        p
    }

    #[tokio::test]
    async fn test_only_liquidatable_positions_are_executed() {
        let mut harness = Harness::new(vec![underwater(1, TOKEN_A), healthy(2, TOKEN_A), healthy(3, TOKEN_B)]);
        let orchestrator = harness.build(&EngineConfig::default());

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.positions_evaluated, 3);
        assert_eq!(report.decisions.len(), 3);
        assert_eq!(report.liquidatable().count(), 1);
        assert_eq!(report.executions.len(), 1);
        assert_eq!(report.executions[0].tranche_id, 1);
        assert_eq!(report.executions[0].outcome, ExecutionOutcome::Submitted);
        assert_eq!(harness.submitter.calls.lock().as_slice(), &[1]);
        assert_eq!(*harness.funding.reads.lock(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_funding_skips_without_submitting() {
        let mut harness = Harness::new(vec![underwater(1, TOKEN_A)]);
        harness.available = U256::from(10u64) * WAD;
        let orchestrator = harness.build(&EngineConfig::default());

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.executions[0].outcome, ExecutionOutcome::SkippedInsufficientFunds);
        assert!(harness.submitter.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_submission_failure_does_not_abort_batch() {
        let mut harness = Harness::new(vec![underwater(1, TOKEN_A), underwater(2, TOKEN_B)]);
        harness.failing_tranches.insert(1);
        let orchestrator = harness.build(&EngineConfig::default());

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.executions.len(), 2);
        assert_eq!(report.executions[0].outcome, ExecutionOutcome::Failed);
        assert_eq!(report.executions[1].outcome, ExecutionOutcome::Submitted);
        assert_eq!(harness.submitter.calls.lock().as_slice(), &[1, 2]);
        // funding re-read before each gate check
        assert_eq!(*harness.funding.reads.lock(), 2);
    }

    #[tokio::test]
    async fn test_spent_funding_skips_next_position() {
        // each full bid is 900, enough funding for one
        let mut harness = Harness::new(vec![underwater(1, TOKEN_A), underwater(2, TOKEN_B)]);
        harness.available = U256::from(1500u64) * WAD;
        let orchestrator = harness.build(&EngineConfig::default());

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.executions.len(), 2);
        assert_eq!(report.executions[0].outcome, ExecutionOutcome::Submitted);
        assert_eq!(report.executions[1].outcome, ExecutionOutcome::SkippedInsufficientFunds);
        assert_eq!(harness.submitter.calls.lock().as_slice(), &[1]);
        assert_eq!(*harness.funding.balance.lock(), U256::from(600u64) * WAD);
    }

    #[tokio::test]
    async fn test_position_fetch_failure_fails_cycle() {
        let mut harness = Harness::new(vec![]);
        harness.fail_positions = true;
        let orchestrator = harness.build(&EngineConfig::default());

        let err = orchestrator.run_cycle().await.unwrap_err();
        assert!(matches!(err, EngineError::Transport { operation: "get positions", .. }));
    }

    #[tokio::test]
    async fn test_lagging_oracle_corrected_once_per_token() {
        let on_chain = MockFeed::new(PriceSource::OnChainOracle, &[(TOKEN_A, usd_cents(90)), (TOKEN_B, WAD)]);
        let market = MockFeed::new(PriceSource::ExternalMarket, &[(TOKEN_A, WAD), (TOKEN_B, WAD)]);
        let mut harness = Harness::with_feeds(
            vec![healthy(1, TOKEN_A), healthy(2, TOKEN_A), healthy(3, TOKEN_B)],
            on_chain,
            market,
        );
        let orchestrator = harness.build(&EngineConfig::default());

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.tokens_corrected, vec![TOKEN_A]);
        assert_eq!(harness.oracle.updates.lock().as_slice(), &[TOKEN_A]);
        // one on-chain and one market read per token, no re-read for market reference
        assert_eq!(*harness.on_chain.calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_on_chain_reference_rereads_after_correction() {
        // the correction writes the market price into the oracle
        let on_chain = MockFeed::new(PriceSource::OnChainOracle, &[(TOKEN_A, usd_cents(50))]);
        let market = MockFeed::new(PriceSource::ExternalMarket, &[(TOKEN_A, WAD)]);
        let mut harness = Harness::with_feeds(vec![underwater(1, TOKEN_A)], on_chain, market);

        let mut config = EngineConfig::default();
        config.reconciliation.reference_source = ReferenceSource::OnChain;
        let orchestrator = harness.build(&config);

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(*harness.on_chain.calls.lock(), 2);
        assert_eq!(report.decisions[0].reference_price, WAD);
        assert!(report.decisions[0].is_liquidatable);
    }

    #[tokio::test]
    async fn test_oracle_failure_isolated_to_token() {
        let on_chain = MockFeed::new(PriceSource::OnChainOracle, &[(TOKEN_A, usd_cents(50)), (TOKEN_B, WAD)]);
        let market = MockFeed::new(PriceSource::ExternalMarket, &[(TOKEN_A, WAD), (TOKEN_B, WAD)]);
        let mut harness = Harness::with_feeds(vec![underwater(1, TOKEN_A), underwater(2, TOKEN_B)], on_chain, market);
        harness.fail_oracle = true;
        let orchestrator = harness.build(&EngineConfig::default());

        let report = orchestrator.run_cycle().await.unwrap();

        assert!(report.tokens_corrected.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].scope, ErrorScope::Token(TOKEN_A));
        // market reference still drives both positions
        assert_eq!(report.executions.len(), 2);
    }

    #[tokio::test]
    async fn test_on_chain_read_failure_requests_no_update() {
        let on_chain = Arc::new(MockFeed {
            source: PriceSource::OnChainOracle,
            prices: Mutex::new(HashMap::from([(TOKEN_B, WAD)])),
            failing: HashSet::from([TOKEN_A]),
            calls: Mutex::new(0),
        });
        let market = MockFeed::new(PriceSource::ExternalMarket, &[(TOKEN_A, WAD), (TOKEN_B, WAD)]);
        let mut harness = Harness::with_feeds(vec![healthy(1, TOKEN_A), healthy(2, TOKEN_B)], on_chain, market);
        let orchestrator = harness.build(&EngineConfig::default());

        let report = orchestrator.run_cycle().await.unwrap();

        assert!(harness.oracle.updates.lock().is_empty());
        assert!(report.tokens_corrected.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].scope, ErrorScope::Token(TOKEN_A));
    }

    #[tokio::test]
    async fn test_market_feed_failure_falls_back_to_on_chain() {
        let on_chain = MockFeed::new(PriceSource::OnChainOracle, &[(TOKEN_A, WAD)]);
        let market = Arc::new(MockFeed {
            source: PriceSource::ExternalMarket,
            prices: Mutex::new(HashMap::new()),
            failing: HashSet::from([TOKEN_A]),
            calls: Mutex::new(0),
        });
        let mut harness = Harness::with_feeds(vec![underwater(1, TOKEN_A)], on_chain, market);
        let orchestrator = harness.build(&EngineConfig::default());

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert!(report.tokens_corrected.is_empty());
        assert!(report.decisions[0].is_liquidatable);
        assert_eq!(report.executions.len(), 1);
    }

    #[tokio::test]
    async fn test_unpriced_token_is_skipped() {
        let on_chain = MockFeed::new(PriceSource::OnChainOracle, &[]);
        let market = MockFeed::new(PriceSource::ExternalMarket, &[]);
        let mut harness = Harness::with_feeds(vec![underwater(1, TOKEN_A)], on_chain, market);
        let orchestrator = harness.build(&EngineConfig::default());

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.decisions[0].ineligibility, Some(Ineligibility::PriceUnavailable));
        assert!(report.executions.is_empty());
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_never_submits() {
        let mut harness = Harness::new(vec![underwater(1, TOKEN_A)]);
        let orchestrator = harness.build(&EngineConfig::testing());

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report.executions[0].outcome, ExecutionOutcome::Simulated);
        assert!(harness.submitter.calls.lock().is_empty());
    }

    #[test]
    fn test_distinct_tokens_keeps_first_seen_order() {
        let positions = vec![healthy(1, TOKEN_B), healthy(2, TOKEN_A), healthy(3, TOKEN_B)];
        assert_eq!(distinct_tokens(&positions).as_slice(), &[TOKEN_B, TOKEN_A]);
    }
}
