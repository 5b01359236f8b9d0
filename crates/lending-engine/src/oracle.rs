//! collateral price oracle
//!
//! prices are quoted in pool-asset units per collateral unit. every quote is
//! checked for freshness and confidence before use; a quote that fails
//! either check rejects the operation that asked for it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::warn;

use crate::config::OracleConfig;
use crate::error::{Error, Result};
use crate::math::mul_div;
use crate::types::{AssetId, Timestamp, Wad, BPS_DENOMINATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Wad,
    /// when the price was observed
    pub as_of: Timestamp,
    /// half-width of the confidence interval, in price units
    pub confidence: Wad,
}

impl PriceQuote {
    pub fn new(price: Wad, as_of: Timestamp) -> Self {
        Self {
            price,
            as_of,
            confidence: Wad::ZERO,
        }
    }

    pub fn with_confidence(mut self, confidence: Wad) -> Self {
        self.confidence = confidence;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("no price feed for {0}")]
    UnknownAsset(AssetId),

    /// transient, worth retrying
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

pub trait PriceOracle: Send + Sync {
    fn get_price(&self, asset: &AssetId) -> std::result::Result<PriceQuote, OracleError>;
}

impl<T: PriceOracle + ?Sized> PriceOracle for std::sync::Arc<T> {
    fn get_price(&self, asset: &AssetId) -> std::result::Result<PriceQuote, OracleError> {
        (**self).get_price(asset)
    }
}

/// checks a quote against the freshness and confidence limits
pub fn validate_quote(
    asset: &AssetId,
    quote: &PriceQuote,
    now: Timestamp,
    config: &OracleConfig,
) -> Result<Wad> {
    if quote.price == Wad::ZERO {
        return Err(Error::InvalidPrice(asset.clone()));
    }

    let age_secs = now.saturating_sub(quote.as_of);
    if age_secs > config.max_age_secs {
        return Err(Error::StalePriceData {
            asset: asset.clone(),
            age_secs,
            max_age_secs: config.max_age_secs,
        });
    }

    let confidence_bps = mul_div(quote.confidence.0, BPS_DENOMINATOR, quote.price.0)?;
    if confidence_bps > config.max_confidence_bps as u128 {
        return Err(Error::PriceConfidenceTooLow {
            asset: asset.clone(),
            confidence_bps,
            max_bps: config.max_confidence_bps,
        });
    }

    Ok(quote.price)
}

/// fetches and validates a price, retrying while the oracle reports itself
/// unavailable. fails closed: no usable quote means an error.
pub fn fetch_price<O: PriceOracle + ?Sized>(
    oracle: &O,
    asset: &AssetId,
    now: Timestamp,
    config: &OracleConfig,
) -> Result<Wad> {
    let attempts = config.retries.saturating_add(1);
    let mut last_reason = String::new();

    for attempt in 1..=attempts {
        match oracle.get_price(asset) {
            Ok(quote) => return validate_quote(asset, &quote, now, config),
            Err(OracleError::Unavailable(reason)) => {
                warn!(asset = %asset, attempt, attempts, %reason, "price fetch failed");
                last_reason = reason;
            }
            Err(e @ OracleError::UnknownAsset(_)) => {
                return Err(Error::OracleUnavailable {
                    asset: asset.clone(),
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(Error::OracleUnavailable {
        asset: asset.clone(),
        attempts,
        reason: last_reason,
    })
}

/// in-process oracle with manually set quotes
#[derive(Debug, Default)]
pub struct FixedPriceOracle {
    quotes: RwLock<HashMap<AssetId, PriceQuote>>,
    /// calls left to fail with `Unavailable`
    outages: AtomicU32,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, asset: impl Into<AssetId>, price: Wad, as_of: Timestamp) {
        self.set_quote(asset, PriceQuote::new(price, as_of));
    }

    pub fn set_quote(&self, asset: impl Into<AssetId>, quote: PriceQuote) {
        self.quotes.write().insert(asset.into(), quote);
    }

    pub fn remove(&self, asset: &AssetId) {
        self.quotes.write().remove(asset);
    }

    /// makes the next `calls` lookups fail as unavailable
    pub fn fail_next(&self, calls: u32) {
        self.outages.store(calls, Ordering::SeqCst);
    }
}

impl PriceOracle for FixedPriceOracle {
    fn get_price(&self, asset: &AssetId) -> std::result::Result<PriceQuote, OracleError> {
        let failing = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(OracleError::Unavailable("feed offline".into()));
        }
        self.quotes
            .read()
            .get(asset)
            .copied()
            .ok_or_else(|| OracleError::UnknownAsset(asset.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> AssetId {
        "PROP".into()
    }

    #[test]
    fn test_fresh_quote_passes() {
        let oracle = FixedPriceOracle::new();
        oracle.set_price("PROP", Wad::from_bps(7000), 100);
        let price = fetch_price(&oracle, &asset(), 130, &OracleConfig::default()).unwrap();
        assert_eq!(price, Wad::from_bps(7000));
    }

    #[test]
    fn test_stale_quote_fails_closed() {
        let oracle = FixedPriceOracle::new();
        oracle.set_price("PROP", Wad::ONE, 100);
        assert_eq!(
            fetch_price(&oracle, &asset(), 161, &OracleConfig::default()),
            Err(Error::StalePriceData {
                asset: asset(),
                age_secs: 61,
                max_age_secs: 60,
            })
        );
    }

    #[test]
    fn test_zero_price_rejected() {
        let quote = PriceQuote::new(Wad::ZERO, 0);
        assert_eq!(
            validate_quote(&asset(), &quote, 0, &OracleConfig::default()),
            Err(Error::InvalidPrice(asset()))
        );
    }

    #[test]
    fn test_wide_confidence_rejected() {
        // 0.03 on a price of 1.0 is 300 bps
        let quote = PriceQuote::new(Wad::ONE, 0).with_confidence(Wad::from_bps(300));
        assert!(matches!(
            validate_quote(&asset(), &quote, 0, &OracleConfig::default()),
            Err(Error::PriceConfidenceTooLow { confidence_bps: 300, .. })
        ));
    }

    #[test]
    fn test_retries_transient_outage() {
        let oracle = FixedPriceOracle::new();
        oracle.set_price("PROP", Wad::ONE, 0);
        oracle.fail_next(2);
        assert_eq!(
            fetch_price(&oracle, &asset(), 0, &OracleConfig::default()).unwrap(),
            Wad::ONE
        );
    }

    #[test]
    fn test_retry_count_excludes_first_attempt() {
        // three retries after the first call: the fourth call succeeds
        let oracle = FixedPriceOracle::new();
        oracle.set_price("PROP", Wad::ONE, 0);
        oracle.fail_next(3);
        assert_eq!(
            fetch_price(&oracle, &asset(), 0, &OracleConfig::default()).unwrap(),
            Wad::ONE
        );
    }

    #[test]
    fn test_gives_up_after_retries() {
        let oracle = FixedPriceOracle::new();
        oracle.set_price("PROP", Wad::ONE, 0);
        oracle.fail_next(4);
        assert!(matches!(
            fetch_price(&oracle, &asset(), 0, &OracleConfig::default()),
            Err(Error::OracleUnavailable { attempts: 4, .. })
        ));
    }

    #[test]
    fn test_zero_retries_makes_one_attempt() {
        let oracle = FixedPriceOracle::new();
        oracle.set_price("PROP", Wad::ONE, 0);
        oracle.fail_next(1);
        let config = OracleConfig {
            retries: 0,
            ..Default::default()
        };
        assert!(matches!(
            fetch_price(&oracle, &asset(), 0, &config),
            Err(Error::OracleUnavailable { attempts: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_asset_not_retried() {
        let oracle = FixedPriceOracle::new();
        assert!(matches!(
            fetch_price(&oracle, &asset(), 0, &OracleConfig::default()),
            Err(Error::OracleUnavailable { attempts: 1, .. })
        ));
    }
}
