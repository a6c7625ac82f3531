use std::fs;
use std::path::Path;

/// Converts Criterion benchmark results into ops/sec
fn main() {
    let benchmark_dir = "target/criterion";

    if !Path::new(benchmark_dir).exists() {
        println!("No benchmark results found. Run 'cargo bench' first.");
        return;
    }

    println!("=== Reward Engine Performance Analysis ===\n");

    let benchmarks = [
        "weighted_draw",
        "spin_settle",
        "spin_settle_x10",
        "wheel_spin",
        "open_pack",
        "daily_claim",
        "redeem_link",
    ];

    for benchmark in &benchmarks {
        analyze_benchmark(benchmark_dir, benchmark);
    }

    let leaderboard_dir = format!("{}/leaderboard", benchmark_dir);
    if Path::new(&leaderboard_dir).exists() {
        println!("\n=== Leaderboard Benchmarks ===");
        analyze_benchmark(&leaderboard_dir, "top_25_of_1000");
        analyze_benchmark(&leaderboard_dir, "top_25_of_10000");
    }
}

fn ops_per_second(nanoseconds: f64) -> f64 {
    1_000_000_000.0 / nanoseconds
}

fn analyze_benchmark(base_dir: &str, benchmark_name: &str) {
    let estimates_path = format!("{}/{}/new/estimates.json", base_dir, benchmark_name);

    if !Path::new(&estimates_path).exists() {
        println!("❌ {} - No results found", benchmark_name);
        return;
    }

    let content = match fs::read_to_string(&estimates_path) {
        Ok(content) => content,
        Err(e) => {
            println!("❌ {} - Error reading results: {}", benchmark_name, e);
            return;
        }
    };
    let Ok(estimates) = serde_json::from_str::<serde_json::Value>(&content) else {
        println!("❌ {} - Unreadable estimates", benchmark_name);
        return;
    };
    let Some(mean) = estimates.get("mean") else {
        return;
    };
    let Some(nanoseconds) = mean.get("point_estimate").and_then(|v| v.as_f64()) else {
        return;
    };

    println!("📊 {}:", benchmark_name);
    println!("   Time per operation: {:.2} μs", nanoseconds / 1000.0);
    println!(
        "   Operations per second: {:.0} ops/sec",
        ops_per_second(nanoseconds)
    );

    if let Some(ci) = mean.get("confidence_interval") {
        if let (Some(lower), Some(upper)) = (
            ci.get("lower_bound").and_then(|v| v.as_f64()),
            ci.get("upper_bound").and_then(|v| v.as_f64()),
        ) {
            // The faster bound is the lower time
            println!(
                "   95% CI: {:.0} - {:.0} ops/sec",
                ops_per_second(upper),
                ops_per_second(lower)
            );
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops_per_second_calculation() {
        // A 2.5 μs spin settles 400k times a second
        assert!((ops_per_second(2_500.0) - 400_000.0).abs() < 1e-6);
        assert!((ops_per_second(37_494.0) - 26_670.4).abs() < 1.0);
    }
}
