//! HTTP feeds for the tranche liquidator.
//!
//! - CoinGecko market prices
//! - The published cached-position snapshot

mod coingecko;
mod position_feed;

pub use coingecko::CoinGeckoClient;
pub use position_feed::{parse_feed, PositionFeedClient};
