// Benchmark Report Types
// Structured JSON output: per-run measurements plus aggregated statistics

use market_integration_engine::numeric;
use serde::Serialize;

/// Two-sided normal quantile for a 95% interval.
const Z_95: f64 = 1.96;

// ─── Statistics (per-metric aggregation across runs) ────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    /// `metric` over every run. The spread is the sample standard deviation,
    /// unlike the engine's population figure; no runs gives all zeros.
    pub fn of<T>(runs: &[T], metric: impl Fn(&T) -> f64) -> Self {
        let samples: Vec<f64> = runs.iter().map(metric).collect();
        let Some(mean) = numeric::mean(&samples) else {
            return Self::default();
        };
        let n = samples.len();
        let std_dev = if n < 2 {
            0.0
        } else {
            let squares: f64 = samples.iter().map(|x| (x - mean).powi(2)).sum();
            (squares / (n - 1) as f64).sqrt()
        };
        let half_width = Z_95 * std_dev / (n as f64).sqrt();
        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        Self {
            mean,
            std_dev,
            ci_lower: mean - half_width,
            ci_upper: mean + half_width,
            min,
            max,
            n,
        }
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub seed: u64,
    pub elapsed_ms: f64,
    pub cached_ms: f64,
    pub regions_merged: usize,
    pub unmatched_regions: usize,
    pub rejected_records: usize,
    pub unavailable_sections: usize,
    pub flow_density: f64,
    pub mean_efficiency: f64,
    pub mean_health: f64,
    pub systemic_risk: f64,
    pub resilience: f64,
    /// Every headline metric finite.
    pub all_finite: bool,
}

// ─── Aggregated Report ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub elapsed_ms: Stats,
    pub cached_ms: Stats,
    pub rejected_records: Stats,
    pub flow_density: Stats,
    pub mean_efficiency: Stats,
    pub mean_health: Stats,
    pub systemic_risk: Stats,
    pub resilience: Stats,
}

impl Aggregates {
    pub fn from_runs(runs: &[RunResult]) -> Self {
        Self {
            elapsed_ms: Stats::of(runs, |r| r.elapsed_ms),
            cached_ms: Stats::of(runs, |r| r.cached_ms),
            rejected_records: Stats::of(runs, |r| r.rejected_records as f64),
            flow_density: Stats::of(runs, |r| r.flow_density),
            mean_efficiency: Stats::of(runs, |r| r.mean_efficiency),
            mean_health: Stats::of(runs, |r| r.mean_health),
            systemic_risk: Stats::of(runs, |r| r.systemic_risk),
            resilience: Stats::of(runs, |r| r.resilience),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub base_seed: u64,
    pub regions: usize,
    pub periods: usize,
    pub parallel: bool,
    pub all_finite: bool,
    pub aggregates: Aggregates,
    pub runs: Vec<RunResult>,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn value(x: &f64) -> f64 {
        *x
    }

    #[test]
    fn stats_of_constant_samples() {
        let s = Stats::of(&[2.0, 2.0, 2.0], value);
        assert_eq!(s.mean, 2.0);
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.ci_lower, s.ci_upper);
        assert_eq!(s.n, 3);
    }

    #[test]
    fn stats_of_nothing() {
        let s = Stats::of(&[], value);
        assert_eq!(s.n, 0);
        assert_eq!(s.mean, 0.0);
    }

    #[test]
    fn interval_brackets_mean() {
        let s = Stats::of(&[1.0, 2.0, 3.0, 4.0], value);
        assert!((s.mean - 2.5).abs() < 1e-12);
        assert!(s.ci_lower < s.mean && s.mean < s.ci_upper);
        assert_eq!((s.min, s.max), (1.0, 4.0));
    }

    #[test]
    fn aggregates_read_each_metric() {
        let run = |seed: u64, elapsed_ms: f64| RunResult {
            seed,
            elapsed_ms,
            cached_ms: 0.01,
            regions_merged: 10,
            unmatched_regions: 0,
            rejected_records: seed as usize,
            unavailable_sections: 0,
            flow_density: 0.1,
            mean_efficiency: 0.5,
            mean_health: 0.6,
            systemic_risk: 0.0,
            resilience: 0.3,
            all_finite: true,
        };
        let a = Aggregates::from_runs(&[run(1, 4.0), run(3, 6.0)]);
        assert_eq!(a.elapsed_ms.mean, 5.0);
        assert_eq!(a.rejected_records.mean, 2.0);
        assert_eq!(a.mean_efficiency.std_dev, 0.0);
    }
}
