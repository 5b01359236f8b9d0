use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use lending_engine::accrual::{borrow_rate, supply_rate};
use lending_engine::{EngineConfig, FixedPriceOracle, LendingEngine, MemoryStore, PoolId, Wad};

mod script;

#[derive(Parser, Debug)]
#[command(name = "lendctl")]
#[command(about = "lending pool rate curves and ledger replay", long_about = None)]
struct Args {
    /// engine configuration (TOML)
    #[arg(long, short, default_value = "lending.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print borrow and supply rates across utilization for a pool
    Curve {
        /// pool id from the config
        #[arg(long)]
        pool: PoolId,

        /// utilization step in basis points
        #[arg(long, default_value_t = 1000)]
        step_bps: u32,
    },

    /// replay a TOML script of ledger operations against an in-memory store
    Replay {
        /// script file
        script: PathBuf,

        /// stop at the first failing step
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lending_engine=info,lendctl=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    match args.command {
        Command::Curve { pool, step_bps } => curve(&config, &pool, step_bps),
        Command::Replay { script, strict } => replay(config, &script, strict),
    }
}

fn curve(config: &EngineConfig, pool: &PoolId, step_bps: u32) -> Result<()> {
    let Some(pool) = config.pools.iter().find(|p| &p.id == pool) else {
        bail!("pool {} not in config", pool);
    };
    if step_bps == 0 {
        bail!("--step-bps must be positive");
    }

    let params = &pool.params;
    println!("{:>12} {:>12} {:>12}", "utilization", "borrow_apy", "supply_apy");
    let mut bps = 0u32;
    while bps <= 10_000 {
        let utilization = Wad::from_bps(bps);
        let borrow = borrow_rate(&params.rate_model, utilization)?;
        let supply = supply_rate(borrow, utilization, params.reserve_factor_bps)?;
        println!(
            "{:>12} {:>12} {:>12}",
            percent(bps as u128),
            percent(borrow.to_bps()),
            percent(supply.to_bps()),
        );
        bps += step_bps;
    }
    Ok(())
}

fn percent(bps: u128) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

fn replay(config: EngineConfig, path: &Path, strict: bool) -> Result<()> {
    let script = script::Script::load(path)?;
    let start = script.steps.first().map(|s| s.at).unwrap_or(0);
    let engine = LendingEngine::from_config(MemoryStore::new(), FixedPriceOracle::new(), &config, start)?;
    info!(steps = script.steps.len(), pools = config.pools.len(), "replaying script");

    let mut failed = 0usize;
    for (index, step) in script.steps.iter().enumerate() {
        let action = step.action.name();
        match script::run_step(&engine, step) {
            Ok(result) => {
                println!(r#"{{"step":{index},"at":{},"action":"{action}","result":{result}}}"#, step.at);
            }
            Err(e) => {
                failed += 1;
                warn!(step = index, action, "step failed: {:#}", e);
                let error = serde_json::to_string(&format!("{e:#}"))?;
                println!(r#"{{"step":{index},"at":{},"action":"{action}","error":{error}}}"#, step.at);
                if strict {
                    bail!("step {} ({}) failed: {:#}", index, action, e);
                }
            }
        }
    }

    info!(failed, "replay finished");
    Ok(())
}
