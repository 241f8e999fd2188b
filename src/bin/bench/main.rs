// Market Integration Benchmark Runner v0.3.0
// Seeded synthetic snapshots (ChaCha8Rng), one full analysis pass per run
//
// Usage:
//   cargo run --release --bin bench                          # 30 runs, 60 regions, 24 months
//   cargo run --release --bin bench -- --runs 5              # Quick mode
//   cargo run --release --bin bench -- --regions 300         # Larger region map
//   cargo run --release --bin bench -- --periods 60          # Longer time series
//   cargo run --release --bin bench -- --seed 42             # Custom base seed
//   cargo run --release --bin bench -- --out results/        # Report directory

mod report;
mod synthetic;

use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use market_integration_engine::{AnalysisContext, AnalysisRequest, EngineConfig, MarketAnalysis, SnapshotKey};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use report::*;

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    runs: usize,
    seed: u64,
    regions: usize,
    periods: usize,
    out: PathBuf,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        runs: 30,
        seed: 0,
        regions: 60,
        periods: 24,
        out: PathBuf::from("benchmark-results"),
    };

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--runs", Some(v)) => cli.runs = v.parse().unwrap_or(30),
            ("--seed", Some(v)) => cli.seed = v.parse().unwrap_or(0),
            ("--regions", Some(v)) => cli.regions = v.parse().unwrap_or(60),
            ("--periods", Some(v)) => cli.periods = v.parse().unwrap_or(24),
            ("--out", Some(v)) => cli.out = PathBuf::from(v),
            (arg, _) => {
                eprintln!("Unknown argument: {arg}");
                i += 1;
                continue;
            }
        }
        i += 2;
    }

    cli
}

// ─── Single run ─────────────────────────────────────────────────────────────

fn run_once(seed: u64, cli: &CliArgs) -> Result<RunResult, market_integration_engine::AnalysisError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let snapshot = synthetic::generate(&mut rng, cli.regions, cli.periods);
    let request = AnalysisRequest {
        key: SnapshotKey::new(synthetic::COMMODITY, snapshot.latest_month, format!("seed-{seed}")),
        dataset: snapshot.dataset,
        processed_at: None,
    };

    let context = AnalysisContext::new(EngineConfig::default())?;
    let start = Instant::now();
    let analysis = context.analyze(&request);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let start = Instant::now();
    let _cached = context.analyze(&request);
    let cached_ms = start.elapsed().as_secs_f64() * 1000.0;

    Ok(measure(seed, &analysis, elapsed_ms, cached_ms))
}

fn measure(seed: u64, analysis: &MarketAnalysis, elapsed_ms: f64, cached_ms: f64) -> RunResult {
    let flow_density = analysis.flows.data().map_or(0.0, |f| f.summary.flow_density);
    let mean_efficiency = analysis.clusters.data().map_or(0.0, |c| c.mean_efficiency);
    let (mean_health, systemic_risk, resilience) = analysis
        .health
        .data()
        .map_or((0.0, 0.0, 0.0), |h| (h.system.mean_health, h.system.systemic_risk, h.system.resilience));

    let cluster_metrics_finite = analysis.clusters.data().map_or(true, |c| {
        c.clusters.iter().all(|e| {
            let m = &e.metrics;
            [
                m.internal_connectivity,
                m.market_coverage,
                m.price_convergence,
                m.price_volatility,
                m.stability,
                m.flow_stability,
                m.efficiency_score,
            ]
            .iter()
            .all(|v| v.is_finite())
        })
    });
    let health_finite = analysis
        .health
        .data()
        .map_or(true, |h| h.regions.values().all(|r| r.health_score.is_finite()));

    RunResult {
        seed,
        elapsed_ms,
        cached_ms,
        regions_merged: analysis.geometry.data().map_or(0, |g| g.regions.len()),
        unmatched_regions: analysis.diagnostics.unmatched_regions,
        rejected_records: analysis.diagnostics.rejected.len(),
        unavailable_sections: analysis.diagnostics.unavailable_sections.len(),
        flow_density,
        mean_efficiency,
        mean_health,
        systemic_risk,
        resilience,
        all_finite: cluster_metrics_finite
            && health_finite
            && [flow_density, mean_efficiency, mean_health, systemic_risk, resilience]
                .iter()
                .all(|v| v.is_finite()),
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = parse_args();

    println!("\n  Market Integration Benchmark Runner v0.3.0");
    println!(
        "  PRNG: ChaCha8Rng | Runs: {} | Base seed: {} | Regions: {} | Periods: {} | Parallel: {}",
        cli.runs,
        cli.seed,
        cli.regions,
        cli.periods,
        cfg!(feature = "parallel")
    );
    println!(
        "\n  {:<8} {:>10} {:>10} {:>8} {:>8} {:>10} {:>10} {:>8}",
        "Seed", "Pass(ms)", "Cache(ms)", "Regions", "Reject", "Effic.", "Health", "Finite"
    );
    println!("  {}", "-".repeat(82));

    let suite_start = Instant::now();
    let mut runs = Vec::with_capacity(cli.runs);
    for r in 0..cli.runs {
        let seed = cli.seed.wrapping_add(r as u64);
        let result = run_once(seed, &cli)?;
        println!(
            "  {:<8} {:>10.2} {:>10.4} {:>8} {:>8} {:>10.4} {:>10.4} {:>8}",
            result.seed,
            result.elapsed_ms,
            result.cached_ms,
            result.regions_merged,
            result.rejected_records,
            result.mean_efficiency,
            result.mean_health,
            if result.all_finite { "yes" } else { "NO" },
        );
        runs.push(result);
    }
    let suite_elapsed = suite_start.elapsed();

    let aggregates = Aggregates::from_runs(&runs);
    let all_finite = runs.iter().all(|r| r.all_finite);

    println!("  {}", "-".repeat(82));
    println!(
        "  Pass time: {:.2}ms ± {:.2}  Efficiency: {:.4}  Health: {:.4}  Suite time: {:.1}s\n",
        aggregates.elapsed_ms.mean,
        (aggregates.elapsed_ms.ci_upper - aggregates.elapsed_ms.ci_lower) / 2.0,
        aggregates.mean_efficiency.mean,
        aggregates.mean_health.mean,
        suite_elapsed.as_secs_f64()
    );

    // ─── Write JSON Report ──────────────────────────────────────────────

    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis().to_string();
    let report = BenchReport {
        timestamp: timestamp.clone(),
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        base_seed: cli.seed,
        regions: cli.regions,
        periods: cli.periods,
        parallel: cfg!(feature = "parallel"),
        all_finite,
        aggregates,
        runs,
    };

    std::fs::create_dir_all(&cli.out)?;
    let path = cli.out.join(format!("bench-{timestamp}.json"));
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    println!("  Results saved to: {}\n", path.display());

    if !all_finite {
        eprintln!("  Non-finite metric detected");
        std::process::exit(1);
    }
    Ok(())
}
