// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Decimal Adapter

//! Adapter layer: converts between the analysis f64 world and `Decimal`.
//!
//! Volumes are summed as fixed-scale decimals so a total does not depend on
//! the order edges arrive in. Every value is rounded to [`ACCUMULATION_DP`]
//! places first; at one scale, decimal addition is exact.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Decimal places kept when accumulating.
pub const ACCUMULATION_DP: u32 = 9;

/// Convert f64 to Decimal at the accumulation scale. `None` for non-finite
/// or out-of-range values.
pub fn to_decimal(v: f64) -> Option<Decimal> {
    Decimal::from_f64(v).map(|d| d.round_dp(ACCUMULATION_DP))
}

/// Convert Decimal to f64.
pub fn from_decimal(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Order-independent sum. Falls back to summing the sorted f64 values when a
/// value does not fit a `Decimal`, which is still order-independent.
pub fn exact_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.into_iter().collect();
    let mut total = Decimal::ZERO;
    for v in &values {
        match to_decimal(*v).and_then(|d| total.checked_add(d)) {
            Some(next) => total = next,
            None => return sorted_sum(values),
        }
    }
    from_decimal(total)
}

fn sorted_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.iter().sum()
}

/// Running per-key decimal total, for strength accumulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecimalTotal {
    total: Decimal,
    overflowed: bool,
}

impl DecimalTotal {
    pub fn add(&mut self, v: f64) {
        match to_decimal(v).and_then(|d| self.total.checked_add(d)) {
            Some(next) => self.total = next,
            None => self.overflowed = true,
        }
    }

    /// Exact decimal total, `None` once a term could not be held.
    pub fn decimal(&self) -> Option<Decimal> {
        (!self.overflowed).then_some(self.total)
    }

    /// Accumulated value; `f64::INFINITY` once a term could not be held,
    /// which callers sanitize.
    pub fn value(&self) -> f64 {
        if self.overflowed {
            f64::INFINITY
        } else {
            from_decimal(self.total)
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn values_round_to_accumulation_scale() {
        assert_eq!(to_decimal(0.1234567891234), Some(dec!(0.123456789)));
        assert_eq!(to_decimal(f64::NAN), None);
        assert_eq!(from_decimal(dec!(2.5)), 2.5);
    }

    #[test]
    fn sum_is_order_independent() {
        let forward = [0.1, 0.2, 0.3, 1e6, 3.333_333_333_3, 7.25];
        let mut backward = forward;
        backward.reverse();
        assert_eq!(exact_sum(forward).to_bits(), exact_sum(backward).to_bits());
        assert!((exact_sum(forward) - 1_000_011.183_333_333).abs() < 1e-6);
    }

    #[test]
    fn non_finite_falls_back_to_sorted_sum() {
        assert!(exact_sum([1.0, f64::INFINITY]).is_infinite());
        assert_eq!(exact_sum(std::iter::empty()), 0.0);
    }

    #[test]
    fn decimal_total_accumulates() {
        let mut t = DecimalTotal::default();
        t.add(2.5);
        t.add(0.25);
        assert_eq!(t.value(), 2.75);
        assert_eq!(t.decimal(), Some(dec!(2.75)));
        t.add(f64::NAN);
        assert_eq!(t.decimal(), None);
        assert!(!t.value().is_finite());
    }
}
