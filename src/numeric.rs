// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Numeric Guards & Shared Statistics

//! Every metric boundary passes through [`sanitize`] (or one of its
//! variants) so a NaN or infinity produced anywhere upstream is replaced by
//! the metric's documented default instead of leaking into a composite.

/// Default for scores, connectivity and coverage.
pub const SCORE_DEFAULT: f64 = 0.0;

/// "Maximally volatile" sentinel used when volatility cannot be computed.
pub const VOLATILITY_DEFAULT: f64 = 1.0;

/// Coefficient of variation reported for a zero-mean sample.
pub const ZERO_MEAN_CV: f64 = 1.0;

/// Replace non-finite values with `default`.
pub fn sanitize(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

/// Non-finite or negative values become `default`.
pub fn sanitize_non_negative(value: f64, default: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        default
    }
}

/// Sanitize then clamp into `[0, 1]`.
pub fn sanitize_unit(value: f64, default: f64) -> f64 {
    sanitize(value, default).clamp(0.0, 1.0)
}

/// Sanitize an optional component. Non-finite becomes `None`.
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Divide, returning `default` when the denominator is zero or the result
/// is not finite.
pub fn safe_div(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 {
        return default;
    }
    sanitize(numerator / denominator, default)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// `std_dev / mean`, or [`ZERO_MEAN_CV`] when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m == 0.0 {
        return Some(ZERO_MEAN_CV);
    }
    let sd = std_dev(values)?;
    finite(Some(sd / m))
}

/// Standard deviation of `ln(p_t / p_{t-1})` over a chronologically ordered
/// price series.
///
/// Non-finite and non-positive prices are skipped. Returns `None` when fewer
/// than two valid prices remain; callers substitute [`VOLATILITY_DEFAULT`].
pub fn log_return_volatility(prices: &[f64]) -> Option<f64> {
    let valid: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect();
    if valid.len() < 2 {
        return None;
    }
    let returns: Vec<f64> = valid.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    finite(std_dev(&returns))
}

/// Lag-1 autocorrelation of a sequence. `None` with fewer than three values
/// or zero variance.
pub fn lag1_autocorrelation(values: &[f64]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    let m = mean(values)?;
    let denominator: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denominator == 0.0 {
        return None;
    }
    let numerator: f64 = values.windows(2).map(|w| (w[0] - m) * (w[1] - m)).sum();
    finite(Some(numerator / denominator))
}

/// Weighted mean over the components that are present and finite; weights of
/// missing components drop out of the denominator. Zero when nothing
/// contributes.
pub fn renormalized_weighted_sum(components: &[(f64, Option<f64>)]) -> f64 {
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for &(weight, value) in components {
        if let Some(v) = finite(value) {
            total += weight * v;
            weight_sum += weight;
        }
    }
    safe_div(total, weight_sum, SCORE_DEFAULT)
}
