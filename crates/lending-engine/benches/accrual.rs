//! benchmark pool accrual and a full deposit/borrow/repay cycle
//!
//! run with: cargo bench -p lending-engine

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lending_engine::accrual::{accrue_pool, interest_factor};
use lending_engine::ledger::{execute_borrow, execute_deposit, execute_repay};
use lending_engine::{Amount, Collateral, Pool, PoolParams, Wad, SECONDS_PER_YEAR};

fn loaded_pool() -> Pool {
    let params = PoolParams {
        accepted_collateral: vec!["PROP".into()],
        ..Default::default()
    };
    let mut pool = Pool::new("bench".into(), "USDC".into(), params, 0);
    pool.total_deposits = Amount::from_units(1_000_000);
    pool.total_shares = Amount::from_units(1_000_000);
    pool.total_borrows = Amount::from_units(850_000);
    pool
}

fn bench_interest_factor(c: &mut Criterion) {
    let mut group = c.benchmark_group("interest_factor");
    for (name, elapsed) in [("minute", 60), ("day", 86_400), ("year", SECONDS_PER_YEAR)] {
        group.bench_function(name, |b| {
            b.iter(|| interest_factor(black_box(Wad::from_bps(2_300)), black_box(elapsed)))
        });
    }
    group.finish();
}

fn bench_accrue_pool(c: &mut Criterion) {
    let pool = loaded_pool();
    c.bench_function("accrue_pool_one_day", |b| {
        b.iter(|| {
            let mut pool = pool.clone();
            accrue_pool(&mut pool, black_box(86_400)).unwrap();
            pool
        })
    });
}

fn bench_ledger_cycle(c: &mut Criterion) {
    c.bench_function("deposit_borrow_repay", |b| {
        b.iter(|| {
            let mut pool = Pool::new(
                "bench".into(),
                "USDC".into(),
                PoolParams {
                    accepted_collateral: vec!["PROP".into()],
                    ..Default::default()
                },
                0,
            );
            execute_deposit(&mut pool, None, &"alice".into(), Amount::from_units(1000), 0).unwrap();
            let borrow = execute_borrow(
                &mut pool,
                None,
                &"bob".into(),
                Amount::from_units(600),
                &Collateral::new("PROP", Amount::from_units(1000)),
                Wad::ONE,
                0,
            )
            .unwrap();
            execute_repay(&mut pool, borrow.position, Amount::from_units(700), 3_600).unwrap()
        })
    });
}

criterion_group!(benches, bench_interest_factor, bench_accrue_pool, bench_ledger_cycle);
criterion_main!(benches);
