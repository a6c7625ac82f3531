use engine::album::PackPayment;
use engine::catalog::Catalog;
use engine::links::NewLink;
use engine::{EngineError, RewardEngine, RewardGrant, RewardKind, UserId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Load testing tool: hammers the engine from many threads, then checks
/// that the ledger still holds its invariants.
fn main() {
    println!("=== Reward Engine Load Testing ===\n");

    test_sustained_spins();
    test_mixed_workload();
    test_contended_user();
    test_link_stampede();
}

fn rich_catalog() -> Catalog {
    let mut catalog = Catalog::default();
    catalog.economy.starting.energy = 1_000_000;
    catalog.economy.starting.coins = 1_000_000;
    catalog.economy.starting.wheel_tokens = 10_000;
    catalog
}

fn engine_with(catalog: Catalog, seed: u64) -> Arc<RewardEngine> {
    match RewardEngine::builder().catalog(catalog).seed(seed).build() {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("failed to build engine: {e}");
            std::process::exit(1);
        }
    }
}

fn register(engine: &RewardEngine, name: &str) -> UserId {
    match engine.register(name, Some(name)) {
        Ok(registration) => registration.user_id,
        Err(e) => {
            eprintln!("failed to register {name}: {e}");
            std::process::exit(1);
        }
    }
}

fn test_sustained_spins() {
    println!("🎰 Testing sustained spins...");

    let engine = engine_with(rich_catalog(), 1);
    let user = register(&engine, "solo");
    let duration = Duration::from_secs(10);
    let start = Instant::now();
    let mut operations = 0u64;
    let mut energy_spent = 0u64;

    while start.elapsed() < duration {
        match engine.spin(user, 1) {
            Ok(outcome) => energy_spent += outcome.energy_spent,
            Err(e) => {
                println!("   Stopped early: {e}");
                break;
            }
        }
        operations += 1;
    }

    let elapsed = start.elapsed();
    let ops_per_second = operations as f64 / elapsed.as_secs_f64();

    println!("   Spins: {}", operations);
    println!("   Energy spent: {}", energy_spent);
    println!("   Duration: {:.2}s", elapsed.as_secs_f64());
    println!("   Throughput: {:.0} ops/sec\n", ops_per_second);
}

fn test_mixed_workload() {
    println!("🔄 Testing mixed workload...");

    let engine = engine_with(rich_catalog(), 2);
    let users: Vec<UserId> = (0..100)
        .map(|i| register(&engine, &format!("player-{i}")))
        .collect();
    let duration = Duration::from_secs(10);
    let start = Instant::now();

    let mut operations = 0u64;
    let mut rejections = 0u64;
    let mut completions = 0u64;

    while start.elapsed() < duration {
        let user = users[(operations as usize) % users.len()];
        let result = match operations % 6 {
            0 | 1 => engine.spin(user, 2).map(|_| ()),
            2 => engine.spin_wheel(user).map(|_| ()),
            3 => engine.open_pack(user, 1, PackPayment::Auto).map(|opening| {
                if opening.album_completed_now {
                    completions += 1;
                }
            }),
            4 => engine.claim_daily(user).map(|_| ()),
            _ => engine.top_n(None).map(|_| ()),
        };
        if result.is_err() {
            rejections += 1;
        }
        operations += 1;
    }

    let elapsed = start.elapsed();
    let ops_per_second = operations as f64 / elapsed.as_secs_f64();

    println!("   Operations: {}", operations);
    println!("   Rejections: {}", rejections);
    println!("   Albums completed: {}", completions);
    println!("   Duration: {:.2}s", elapsed.as_secs_f64());
    println!("   Throughput: {:.0} ops/sec\n", ops_per_second);
}

fn test_contended_user() {
    println!("⚡ Testing concurrent spins on one user...");

    let mut catalog = rich_catalog();
    catalog.economy.starting.energy = 20_000;
    catalog.economy.max_tx_attempts = 64;
    let engine = engine_with(catalog, 3);
    let user = register(&engine, "contended");

    let spins = Arc::new(AtomicU64::new(0));
    let conflicts = Arc::new(AtomicU64::new(0));
    let duration = Duration::from_secs(5);
    let num_threads = 8;
    let mut handles = vec![];

    for _ in 0..num_threads {
        let engine = Arc::clone(&engine);
        let spins = Arc::clone(&spins);
        let conflicts = Arc::clone(&conflicts);

        handles.push(thread::spawn(move || {
            let start = Instant::now();
            while start.elapsed() < duration {
                match engine.spin(user, 1) {
                    Ok(_) => {
                        spins.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(EngineError::Conflict { .. }) => {
                        conflicts.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => break,
                }
            }
        }));
    }

    for handle in handles {
        if handle.join().is_err() {
            eprintln!("   worker thread panicked");
        }
    }

    let total = spins.load(Ordering::Relaxed);
    let profile = match engine.profile(user) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("   profile failed: {e}");
            return;
        }
    };

    println!("   Threads: {}", num_threads);
    println!("   Spins settled: {}", total);
    println!("   Conflicts surfaced: {}", conflicts.load(Ordering::Relaxed));
    println!("   Throughput: {:.0} ops/sec", total as f64 / duration.as_secs_f64());
    // Every settled spin was counted exactly once
    let consistent = profile.lifetime_spins == total;
    println!(
        "   Lifetime spins {} (expected {}): {}\n",
        profile.lifetime_spins,
        total,
        if consistent { "OK" } else { "MISMATCH" }
    );
}

fn test_link_stampede() {
    println!("🔗 Testing reward link stampede...");

    let engine = engine_with(rich_catalog(), 4);
    let uses = 50;
    let link = match engine.create_link(NewLink {
        grant: RewardGrant::new(RewardKind::Coins, 100),
        uses,
        title: "Stampede".to_string(),
        note: None,
        created_by: None,
    }) {
        Ok(link) => link,
        Err(e) => {
            eprintln!("   create_link failed: {e}");
            return;
        }
    };
    let users: Vec<UserId> = (0..400)
        .map(|i| register(&engine, &format!("fan-{i}")))
        .collect();

    let winners = Arc::new(AtomicU64::new(0));
    let start = Instant::now();
    let handles: Vec<_> = users
        .chunks(50)
        .map(|chunk| {
            let engine = Arc::clone(&engine);
            let winners = Arc::clone(&winners);
            let token = link.token.clone();
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                for user in chunk {
                    if engine.redeem(user, &token).is_ok() {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        if handle.join().is_err() {
            eprintln!("   worker thread panicked");
        }
    }

    let won = winners.load(Ordering::Relaxed);
    println!("   Contenders: {}", users.len());
    println!("   Uses: {}", uses);
    println!("   Winners: {} ({})", won, if won == u64::from(uses) { "OK" } else { "MISMATCH" });
    println!("   Duration: {:.2}ms\n", start.elapsed().as_secs_f64() * 1000.0);
}
