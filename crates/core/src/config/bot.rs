//! Engine configuration with profile support.
//!
//! Every tunable of the risk engine lives here: reconciliation tolerance,
//! eligibility thresholds, sizing constants, execution mode and poll timing.
//! Profiles (default, production, testing) are selected with `BOT_PROFILE`,
//! which may also point at a TOML file.

use std::time::Duration;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::position::TrancheId;
use crate::price::ReferenceSource;
use crate::u256_math::f64_to_wad;

/// Main configuration structure containing all engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    #[serde(default)]
    pub eligibility: EligibilityConfig,

    #[serde(default)]
    pub sizing: SizingConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// On-chain vs market price reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Correct the oracle when `onChain × (1 + tolerance) < market` (500 = 5%)
    #[serde(default = "default_tolerance_bps")]
    pub tolerance_bps: u16,

    /// Quote positions are evaluated against
    #[serde(default)]
    pub reference_source: ReferenceSource,

    /// Skip oracle corrections entirely
    #[serde(default = "default_corrections_enabled")]
    pub corrections_enabled: bool,
}

fn default_tolerance_bps() -> u16 {
    500
}
fn default_corrections_enabled() -> bool {
    true
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tolerance_bps: default_tolerance_bps(),
            reference_source: ReferenceSource::default(),
            corrections_enabled: default_corrections_enabled(),
        }
    }
}

/// Liquidation eligibility thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// `liquidationPrice × pct / 100` must exceed the reference price
    #[serde(default = "default_safety_margin")]
    pub safety_margin_pct: u32,

    /// Debt must be strictly above this (USD)
    #[serde(default = "default_min_debt")]
    pub min_debt_usd: f64,

    /// Tranches never liquidated
    #[serde(default)]
    pub excluded_tranches: Vec<TrancheId>,
}

fn default_safety_margin() -> u32 {
    125
}
fn default_min_debt() -> f64 {
    1.0
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            safety_margin_pct: default_safety_margin(),
            min_debt_usd: default_min_debt(),
            excluded_tranches: Vec::new(),
        }
    }
}

impl EligibilityConfig {
    pub fn min_debt_wad(&self) -> U256 {
        f64_to_wad(self.min_debt_usd)
    }
}

/// Bid sizing constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Net debt above this percent of collateral value means full liquidation
    #[serde(default = "default_full_liquidation_pct")]
    pub full_liquidation_pct: u32,

    #[serde(default = "default_markup_numerator")]
    pub bid_markup_numerator: u64,

    #[serde(default = "default_markup_denominator")]
    pub bid_markup_denominator: u64,

    /// Bid target (USD) assumed when `viewBidTarget` fails
    #[serde(default)]
    pub bid_target_fallback_usd: f64,
}

fn default_full_liquidation_pct() -> u32 {
    87
}
fn default_markup_numerator() -> u64 {
    1000
}
fn default_markup_denominator() -> u64 {
    984
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            full_liquidation_pct: default_full_liquidation_pct(),
            bid_markup_numerator: default_markup_numerator(),
            bid_markup_denominator: default_markup_denominator(),
            bid_target_fallback_usd: 0.0,
        }
    }
}

impl SizingConfig {
    pub fn bid_target_fallback_wad(&self) -> U256 {
        f64_to_wad(self.bid_target_fallback_usd)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Evaluate and size, never submit
    #[serde(default)]
    pub dry_run: bool,
}

/// Poll loop timing and read fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Concurrent contract reads while gathering positions
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
}

fn default_poll_interval() -> u64 {
    30
}
fn default_read_concurrency() -> usize {
    16
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            read_concurrency: default_read_concurrency(),
        }
    }
}

impl ScannerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            reconciliation: ReconciliationConfig::default(),
            eligibility: EligibilityConfig::default(),
            sizing: SizingConfig::default(),
            execution: ExecutionConfig::default(),
            scanner: ScannerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Dry-run profile with fast polling and no dust filter.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            eligibility: EligibilityConfig {
                min_debt_usd: 0.0001,
                ..Default::default()
            },
            execution: ExecutionConfig { dry_run: true },
            scanner: ScannerConfig {
                poll_interval_secs: 10,
                read_concurrency: 4,
            },
            ..Default::default()
        }
    }

    /// Live submissions with a $10 dust floor.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            eligibility: EligibilityConfig {
                min_debt_usd: 10.0,
                ..Default::default()
            },
            scanner: ScannerConfig {
                poll_interval_secs: 30,
                read_concurrency: 32,
            },
            ..Default::default()
        }
    }

    pub fn load_profile(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "testing" | "test" => Some(Self::testing()),
            "production" | "prod" => Some(Self::production()),
            "default" => Some(Self::default()),
            _ => None,
        }
    }

    /// Resolve `BOT_PROFILE`: a profile name, a path to a TOML file, or unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        if profile.ends_with(".toml") {
            return Self::from_file(&profile);
        }
        Self::load_profile(&profile)
            .ok_or_else(|| anyhow::anyhow!("Unknown BOT_PROFILE '{}'", profile))
    }

    /// Fold deployment-level exclusions into the eligibility set.
    pub fn exclude_tranches(&mut self, tranche_ids: impl IntoIterator<Item = TrancheId>) {
        for id in tranche_ids {
            if !self.eligibility.excluded_tranches.contains(&id) {
                self.eligibility.excluded_tranches.push(id);
            }
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            tolerance_bps = self.reconciliation.tolerance_bps,
            reference = ?self.reconciliation.reference_source,
            corrections = self.reconciliation.corrections_enabled,
            "Price reconciliation"
        );
        tracing::info!(
            safety_margin_pct = self.eligibility.safety_margin_pct,
            min_debt = self.eligibility.min_debt_usd,
            excluded = ?self.eligibility.excluded_tranches,
            "Eligibility thresholds"
        );
        tracing::info!(
            full_pct = self.sizing.full_liquidation_pct,
            markup = %format!("{}/{}", self.sizing.bid_markup_numerator, self.sizing.bid_markup_denominator),
            fallback = self.sizing.bid_target_fallback_usd,
            "Bid sizing"
        );
        tracing::info!(
            dry_run = self.execution.dry_run,
            poll_secs = self.scanner.poll_interval_secs,
            "Execution"
        );
    }
}
