//! Risk evaluation and bid sizing for tranche liquidations.
//!
//! This crate provides the liquidation engine:
//! - Position snapshots and adapters for ledger rows and cached feed records
//! - Oracle/market price reconciliation
//! - Eligibility evaluation (liquidation price, debt ratio, exclusions)
//! - Closed-form full/partial bid sizing
//! - A funding gate in front of submission
//! - The per-cycle orchestrator
//!
//! Chain and HTTP access is injected through the traits in [`collaborators`].

mod bid_sizer;
pub mod collaborators;
pub mod config;
mod eligibility;
mod error;
mod execution;
mod orchestrator;
mod position;
mod price;
pub mod u256_math;

pub use bid_sizer::{plan_sizing, BidMode, BidPlan, BidSizer, Sizing, SizingParams};
pub use collaborators::{
    BidTargetQuoter, FundingSource, LiquidationSubmitter, OracleUpdater, PositionSource, PriceFeed,
    PriceSources, SnapshotFeed, TokenMetadata,
};
pub use config::{load_deployment, load_deployment_from_env, EngineConfig, ResolvedDeployment};
pub use eligibility::{EligibilityEvaluator, Ineligibility, LiquidationDecision};
pub use error::EngineError;
pub use execution::{ExecutionGate, ExecutionOutcome, ExecutionResult};
pub use orchestrator::{Collaborators, CycleError, CycleReport, ErrorScope, LiquidationOrchestrator};
pub use position::{
    merge_positions, CachedPositionRecord, CachedPositionSet, OnChainPositionRow, PositionSnapshot,
    TrancheId, MAX_BORROWABLE_PER_10K,
};
pub use price::{should_correct_price, PriceQuote, PriceReconciler, PriceSource, ReferenceSource, TokenPrices};
