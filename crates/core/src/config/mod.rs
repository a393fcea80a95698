//! Configuration for the liquidation engine.
//!
//! This module provides:
//! - Engine runtime configuration (profiles, thresholds, timing)
//! - Deployment configuration (chain, contract addresses, tracked tokens)
//! - A loader that expands `${ENV}` references and parses addresses

mod bot;
mod deployment;
mod loader;

pub use bot::{
    EligibilityConfig, EngineConfig, ExecutionConfig, ReconciliationConfig, ScannerConfig,
    SizingConfig,
};

pub use deployment::{
    DeploymentConfig, DeploymentContracts, DeploymentDetails, Exclusions, GasPricing, GasSettings,
    TokenEntry,
};

pub use loader::{
    expand_env, load_deployment, load_deployment_from_env, resolve, ResolvedContracts,
    ResolvedDeployment, ResolvedToken,
};
