//! Avalanche chain access for the tranche liquidator.
//!
//! This crate provides:
//! - Contract bindings for the lending ledger, liquidation module, strategy
//!   viewer, peg oracle and ERC20 tokens
//! - Position batch assembly over ledger tracking periods
//! - Token metadata and oracle quotes
//! - Transaction signing and sending (nonce tracking, legacy + EIP-1559 gas)
//!
//! Every reader implements one of the `tranche-core` collaborator traits.

mod context;
mod contracts;
pub mod gas;
mod liquidation;
mod metadata;
mod oracle;
mod positions;
mod signer;

pub use context::ChainContext;
pub use liquidation::{FundingReader, LiquidationContract};
pub use metadata::TokenMetadataReader;
pub use oracle::PegOracle;
pub use positions::{refreshed_snapshot, tracking_periods, StableLendingReader, TRACKING_PERIOD_SECS};
pub use signer::{load_private_key, read_key_file, NonceManager, TransactionSender, KEY_FILE_NAME};
