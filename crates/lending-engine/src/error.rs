//! error types for the lending engine

use thiserror::Error;

use crate::types::{AccountId, Amount, AssetId, PoolId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // === validation errors ===
    #[error("invalid amount for `{field}`: must be greater than zero")]
    InvalidAmount { field: &'static str },

    #[error("deposit of {amount} is below the pool minimum of {minimum}")]
    BelowMinimumDeposit { amount: Amount, minimum: Amount },

    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    // === pool errors ===
    #[error("pool {0} not found")]
    PoolNotFound(PoolId),

    #[error("pool {0} already exists")]
    PoolExists(PoolId),

    #[error("pool {0} is paused")]
    PoolPaused(PoolId),

    #[error("pool {0} is not active")]
    PoolInactive(PoolId),

    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },

    // === position errors ===
    #[error("no position for {holder} in pool {pool}")]
    PositionNotFound { pool: PoolId, holder: AccountId },

    #[error("insufficient shares: requested {requested}, held {available}")]
    InsufficientShares { requested: Amount, available: Amount },

    #[error("insufficient collateral: debt would be {requested}, maximum borrow is {max_borrow}")]
    InsufficientCollateral { max_borrow: Amount, requested: Amount },

    #[error("health factor {health_factor} below 1.0")]
    HealthFactorTooLow { health_factor: String },

    #[error("collateral asset {asset} is not accepted by pool {pool}")]
    CollateralNotAccepted { pool: PoolId, asset: AssetId },

    #[error("position is collateralized with {existing}, got {requested}")]
    CollateralMismatch { existing: AssetId, requested: AssetId },

    #[error("withdrawal of {requested} collateral exceeds {available} held")]
    CollateralExceeded { requested: Amount, available: Amount },

    #[error("position of {0} is not liquidatable")]
    NotLiquidatable(AccountId),

    #[error("liquidating {0} would seize no collateral")]
    NothingToSeize(AccountId),

    // === oracle errors ===
    #[error("stale price for {asset}: {age_secs}s old, max {max_age_secs}s")]
    StalePriceData { asset: AssetId, age_secs: u64, max_age_secs: u64 },

    #[error("price confidence for {asset} too wide: {confidence_bps} bps, max {max_bps} bps")]
    PriceConfidenceTooLow { asset: AssetId, confidence_bps: u128, max_bps: u32 },

    #[error("invalid price for {0}")]
    InvalidPrice(AssetId),

    #[error("oracle unavailable for {asset} after {attempts} attempts: {reason}")]
    OracleUnavailable { asset: AssetId, attempts: u32, reason: String },

    // === infrastructure errors ===
    #[error("math overflow")]
    MathOverflow,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("concurrent update on pool {pool}: expected version {expected}, found {found}")]
    Conflict { pool: PoolId, expected: u64, found: u64 },

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid_param(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}
