//! replay scripts
//!
//! a script is a TOML list of timestamped steps run in order against an
//! in-memory ledger:
//!
//! ```toml
//! [[steps]]
//! at = 0
//! action = "price"
//! asset = "PROP-001"
//! price = "1.0"
//!
//! [[steps]]
//! at = 0
//! action = "deposit"
//! pool = "usdc-main"
//! account = "alice"
//! amount = "1000"
//! ```
//!
//! amounts and prices are decimal strings.

use anyhow::{Context, Result};
use lending_engine::{
    AccountId, Amount, AssetId, Collateral, FixedPriceOracle, LedgerStore, LendingEngine, PoolId,
    PriceQuote, Timestamp, Wad,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        toml::from_str(&input).with_context(|| format!("parsing script {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
pub struct Step {
    pub at: Timestamp,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Price {
        asset: AssetId,
        price: String,
        /// defaults to the step time
        as_of: Option<Timestamp>,
        confidence: Option<String>,
    },
    Deposit {
        pool: PoolId,
        account: AccountId,
        amount: String,
    },
    Withdraw {
        pool: PoolId,
        account: AccountId,
        shares: String,
    },
    Borrow {
        pool: PoolId,
        account: AccountId,
        amount: String,
        collateral_asset: AssetId,
        collateral_amount: String,
    },
    Repay {
        pool: PoolId,
        account: AccountId,
        amount: String,
    },
    AddCollateral {
        pool: PoolId,
        account: AccountId,
        collateral_asset: AssetId,
        amount: String,
    },
    WithdrawCollateral {
        pool: PoolId,
        account: AccountId,
        amount: String,
    },
    Liquidate {
        pool: PoolId,
        account: AccountId,
        liquidator: AccountId,
        amount: String,
    },
    Pause {
        pool: PoolId,
    },
    Unpause {
        pool: PoolId,
    },
    Retire {
        pool: PoolId,
    },
    Reactivate {
        pool: PoolId,
    },
    Snapshot {
        pool: PoolId,
    },
    HealthFactor {
        pool: PoolId,
        account: AccountId,
    },
    ListLiquidatable {
        pool: PoolId,
    },
    ListBadDebt {
        pool: PoolId,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Price { .. } => "price",
            Action::Deposit { .. } => "deposit",
            Action::Withdraw { .. } => "withdraw",
            Action::Borrow { .. } => "borrow",
            Action::Repay { .. } => "repay",
            Action::AddCollateral { .. } => "add_collateral",
            Action::WithdrawCollateral { .. } => "withdraw_collateral",
            Action::Liquidate { .. } => "liquidate",
            Action::Pause { .. } => "pause",
            Action::Unpause { .. } => "unpause",
            Action::Retire { .. } => "retire",
            Action::Reactivate { .. } => "reactivate",
            Action::Snapshot { .. } => "snapshot",
            Action::HealthFactor { .. } => "health_factor",
            Action::ListLiquidatable { .. } => "list_liquidatable",
            Action::ListBadDebt { .. } => "list_bad_debt",
        }
    }
}

fn amount(input: &str) -> Result<Amount> {
    Ok(input.parse::<Amount>()?)
}

fn wad(input: &str) -> Result<Wad> {
    Ok(input.parse::<Wad>()?)
}

// serialized straight to text: health factors and wads overflow `serde_json::Value`
fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// runs one step and returns its result as a JSON document
pub fn run_step<S: LedgerStore>(
    engine: &LendingEngine<S, FixedPriceOracle>,
    step: &Step,
) -> Result<String> {
    let now = step.at;
    let value = match &step.action {
        Action::Price {
            asset,
            price,
            as_of,
            confidence,
        } => {
            let mut quote = PriceQuote::new(wad(price)?, as_of.unwrap_or(now));
            if let Some(confidence) = confidence {
                quote = quote.with_confidence(wad(confidence)?);
            }
            engine.oracle().set_quote(asset.clone(), quote);
            encode(&quote)?
        }
        Action::Deposit {
            pool,
            account,
            amount: value,
        } => encode(&engine.deposit(pool, account, amount(value)?, now)?)?,
        Action::Withdraw {
            pool,
            account,
            shares,
        } => encode(&engine.withdraw(pool, account, amount(shares)?, now)?)?,
        Action::Borrow {
            pool,
            account,
            amount: value,
            collateral_asset,
            collateral_amount,
        } => {
            let collateral = Collateral::new(collateral_asset.clone(), amount(collateral_amount)?);
            encode(&engine.borrow(pool, account, collateral, amount(value)?, now)?)?
        }
        Action::Repay {
            pool,
            account,
            amount: value,
        } => encode(&engine.repay(pool, account, amount(value)?, now)?)?,
        Action::AddCollateral {
            pool,
            account,
            collateral_asset,
            amount: value,
        } => {
            let collateral = Collateral::new(collateral_asset.clone(), amount(value)?);
            encode(&engine.add_collateral(pool, account, collateral, now)?)?
        }
        Action::WithdrawCollateral {
            pool,
            account,
            amount: value,
        } => encode(&engine.withdraw_collateral(pool, account, amount(value)?, now)?)?,
        Action::Liquidate {
            pool,
            account,
            liquidator,
            amount: value,
        } => encode(&engine.liquidate(pool, account, liquidator, amount(value)?, now)?)?,
        Action::Pause { pool } => encode(&engine.set_paused(pool, true, now)?)?,
        Action::Unpause { pool } => encode(&engine.set_paused(pool, false, now)?)?,
        Action::Retire { pool } => encode(&engine.set_active(pool, false, now)?)?,
        Action::Reactivate { pool } => encode(&engine.set_active(pool, true, now)?)?,
        Action::Snapshot { pool } => encode(&engine.snapshot(pool, now)?)?,
        Action::HealthFactor { pool, account } => {
            let hf = engine.health_factor(pool, account, now)?;
            encode(&json!({ "health_factor": hf.to_string(), "healthy": hf.is_healthy() }))?
        }
        Action::ListLiquidatable { pool } => {
            encode(&engine.list_liquidatable(pool, now)?)?
        }
        Action::ListBadDebt { pool } => encode(&engine.list_bad_debt(pool, now)?)?,
    };
    Ok(value)
}
