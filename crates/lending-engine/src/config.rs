//! pool parameters and engine configuration
//!
//! everything here deserializes from TOML:
//!
//! ```toml
//! [oracle]
//! max_age_secs = 60
//!
//! [[pools]]
//! id = "usdc-main"
//! asset = "USDC"
//!
//! [pools.params]
//! liquidation_threshold_bps = 8000
//! accepted_collateral = ["PROP-001"]
//!
//! [pools.params.rate_model]
//! base_rate_bps = 500
//! slope_bps = 2000
//! kink_utilization_bps = 8000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Amount, AssetId, PoolId, BPS_DENOMINATOR};

const MAX_BPS: u32 = BPS_DENOMINATOR as u32;

/// utilization-sensitive borrow rate curve
///
/// `borrow_apy = base + min(u, kink) * slope + max(u - kink, 0) * slope * jump_multiplier`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateModel {
    /// annual rate at zero utilization
    pub base_rate_bps: u32,
    /// annual rate added per 100% utilization below the kink
    pub slope_bps: u32,
    /// utilization beyond which the slope steepens; `None` keeps the curve linear
    pub kink_utilization_bps: Option<u32>,
    /// slope multiplier above the kink
    pub jump_multiplier: u32,
}

impl Default for RateModel {
    fn default() -> Self {
        Self {
            base_rate_bps: 500,
            slope_bps: 2000,
            kink_utilization_bps: Some(8000),
            jump_multiplier: 2,
        }
    }
}

/// per-pool risk and rate parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolParams {
    /// share of borrower interest kept as protocol reserves
    pub reserve_factor_bps: u32,
    /// maximum loan-to-value for new borrows
    pub collateral_factor_bps: u32,
    /// weight applied to collateral value in the health factor
    pub liquidation_threshold_bps: u32,
    /// bonus paid to liquidators on seized collateral
    pub liquidation_penalty_bps: u32,
    /// maximum share of debt a single liquidation may repay
    pub close_factor_bps: u32,
    pub rate_model: RateModel,
    /// smallest accepted deposit, zero disables the check
    pub min_deposit: Amount,
    /// assets accepted as borrow collateral
    pub accepted_collateral: Vec<AssetId>,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            reserve_factor_bps: 1000,
            collateral_factor_bps: 7500,
            liquidation_threshold_bps: 8000,
            liquidation_penalty_bps: 500,
            close_factor_bps: 5000,
            rate_model: RateModel::default(),
            min_deposit: Amount::ZERO,
            accepted_collateral: Vec::new(),
        }
    }
}

impl PoolParams {
    pub fn accepts(&self, asset: &AssetId) -> bool {
        self.accepted_collateral.iter().any(|a| a == asset)
    }

    pub fn validate(&self) -> Result<()> {
        check_bps("reserve_factor_bps", self.reserve_factor_bps)?;
        check_bps("collateral_factor_bps", self.collateral_factor_bps)?;
        check_bps("liquidation_threshold_bps", self.liquidation_threshold_bps)?;
        check_bps("close_factor_bps", self.close_factor_bps)?;

        if self.collateral_factor_bps > self.liquidation_threshold_bps {
            return Err(Error::invalid_param(
                "collateral_factor_bps",
                "must not exceed liquidation_threshold_bps",
            ));
        }
        if self.liquidation_threshold_bps == 0 {
            return Err(Error::invalid_param("liquidation_threshold_bps", "must be positive"));
        }
        if self.close_factor_bps == 0 {
            return Err(Error::invalid_param("close_factor_bps", "must be positive"));
        }
        // bonus on top of repaid debt, at most 50%
        if self.liquidation_penalty_bps > MAX_BPS / 2 {
            return Err(Error::invalid_param("liquidation_penalty_bps", "must be at most 5000"));
        }
        if let Some(kink) = self.rate_model.kink_utilization_bps {
            if kink == 0 || kink >= MAX_BPS {
                return Err(Error::invalid_param(
                    "kink_utilization_bps",
                    "must lie strictly between 0 and 10000",
                ));
            }
        }
        Ok(())
    }
}

fn check_bps(field: &'static str, value: u32) -> Result<()> {
    if value > MAX_BPS {
        return Err(Error::invalid_param(field, format!("{value} exceeds 10000 bps")));
    }
    Ok(())
}

/// price freshness and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// quotes older than this are rejected
    pub max_age_secs: u64,
    /// widest accepted confidence interval relative to price
    pub max_confidence_bps: u32,
    /// extra attempts after the first when the oracle reports itself unavailable
    pub retries: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 60,
            max_confidence_bps: 200,
            retries: 3,
        }
    }
}

/// A pool declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub id: PoolId,
    /// display name, the id when absent
    #[serde(default)]
    pub name: Option<String>,
    pub asset: AssetId,
    #[serde(default)]
    pub asset_address: Option<String>,
    #[serde(default)]
    pub params: PoolParams,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub oracle: OracleConfig,
    pub pools: Vec<PoolConfig>,
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<()> {
        for pool in &self.pools {
            if pool.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
                return Err(Error::invalid_param("name", format!("empty name for pool {}", pool.id)));
            }
            pool.params.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        PoolParams::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_collateral_factor_above_threshold() {
        let params = PoolParams {
            collateral_factor_bps: 9000,
            liquidation_threshold_bps: 8000,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidParameter { field: "collateral_factor_bps", .. })
        ));
    }

    #[test]
    fn test_rejects_bad_kink() {
        let mut params = PoolParams::default();
        params.rate_model.kink_utilization_bps = Some(10_000);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [oracle]
            max_age_secs = 30

            [[pools]]
            id = "usdc-main"
            name = "USDC main market"
            asset = "USDC"

            [pools.params]
            liquidation_penalty_bps = 700
            accepted_collateral = ["PROP-001"]

            [pools.params.rate_model]
            base_rate_bps = 200
            "#,
        )
        .unwrap();

        assert_eq!(config.oracle.max_age_secs, 30);
        assert_eq!(config.oracle.retries, 3);
        let pool = &config.pools[0];
        assert_eq!(pool.id, PoolId::from("usdc-main"));
        assert_eq!(pool.name.as_deref(), Some("USDC main market"));
        assert_eq!(pool.asset_address, None);
        assert_eq!(pool.params.liquidation_penalty_bps, 700);
        assert_eq!(pool.params.rate_model.base_rate_bps, 200);
        assert_eq!(pool.params.rate_model.slope_bps, 2000);
        assert!(pool.params.accepts(&AssetId::from("PROP-001")));
    }

    #[test]
    fn test_rejects_blank_pool_name() {
        let result = EngineConfig::from_toml_str(
            r#"
            [[pools]]
            id = "usdc-main"
            name = "  "
            asset = "USDC"
            "#,
        );
        assert!(matches!(result, Err(Error::InvalidParameter { field: "name", .. })));
    }

    #[test]
    fn test_parse_rejects_invalid_params() {
        let result = EngineConfig::from_toml_str(
            r#"
            [[pools]]
            id = "bad"
            asset = "USDC"

            [pools.params]
            close_factor_bps = 0
            "#,
        );
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }
}
