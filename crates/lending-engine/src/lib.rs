//! collateralized lending pools
//!
//! pool accounting with utilization-driven interest, health-factor gated
//! borrowing and close-factor liquidation.
//!
//! ```text
//!              LendingEngine (per-pool locks)
//!       ┌────────────┼──────────────┬───────────────┐
//!       ▼            ▼              ▼               ▼
//!    ledger ──▶ accrual        health ◀── liquidation
//!       │        (rates,       (risk score)   (close factor,
//!       │       index)              ▲           penalty)
//!       ▼                           │
//!  LedgerStore                 PriceOracle
//! ```
//!
//! amounts are 7-decimal fixed point, rates and prices 18-decimal; no
//! floating point anywhere.

pub mod accrual;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod ledger;
pub mod liquidation;
pub mod math;
pub mod oracle;
pub mod pool;
pub mod position;
pub mod store;
pub mod types;

pub use config::{EngineConfig, OracleConfig, PoolConfig, PoolParams, RateModel};
pub use engine::LendingEngine;
pub use error::{Error, Result};
pub use health::HealthFactor;
pub use ledger::{BorrowOutcome, CollateralOutcome, DepositOutcome, RepayOutcome, WithdrawOutcome};
pub use liquidation::{LiquidationCandidate, LiquidationOutcome, LiquidationReport};
pub use oracle::{FixedPriceOracle, OracleError, PriceOracle, PriceQuote};
pub use pool::{Pool, PoolSnapshot};
pub use position::{BorrowPosition, DepositPosition};
pub use store::{Changeset, LedgerStore, MemoryStore};
pub use types::*;
