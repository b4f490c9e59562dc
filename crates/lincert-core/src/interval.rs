//! Closed real intervals with the arithmetic needed for interval extensions.
//!
//! Every operation returns an interval that contains the exact result of the
//! operation applied to any pair of points drawn from the operands. Operands
//! are treated as independent, so expressions like `a - a` are not tightened
//! to zero (the usual dependency problem of interval arithmetic).

use crate::{LincertError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Neg, RangeInclusive, Sub};

/// A closed interval `[lo, hi]` on the real line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    /// Create a new interval.
    #[inline]
    pub fn new(lo: f64, hi: f64) -> Self {
        debug_assert!(lo <= hi, "Invalid interval: {lo} > {hi}");
        Self { lo, hi }
    }

    /// Create an interval from untrusted endpoints.
    pub fn checked(lo: f64, hi: f64) -> Result<Self> {
        if lo.is_nan() || hi.is_nan() {
            return Err(LincertError::InvalidInput(format!(
                "interval endpoints must not be NaN (got [{lo}, {hi}])"
            )));
        }
        if lo > hi {
            return Err(LincertError::InvalidInput(format!(
                "interval lower endpoint {lo} exceeds upper endpoint {hi}"
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Degenerate interval containing a single point.
    #[inline]
    pub fn point(value: f64) -> Self {
        Self {
            lo: value,
            hi: value,
        }
    }

    /// Symmetric interval `[center - radius, center + radius]`.
    #[inline]
    pub fn centered(center: f64, radius: f64) -> Self {
        debug_assert!(radius >= 0.0, "Negative radius: {radius}");
        Self {
            lo: center - radius,
            hi: center + radius,
        }
    }

    #[inline]
    pub fn midpoint(&self) -> f64 {
        // Halve first so that huge endpoints do not overflow.
        self.lo / 2.0 + self.hi / 2.0
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.width() / 2.0
    }

    /// Check if this interval contains a value (endpoints included).
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.lo <= value && value <= self.hi
    }

    /// Check if `other` lies entirely inside this interval.
    #[inline]
    pub fn encloses(&self, other: &Interval) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    #[inline]
    pub fn is_point(&self) -> bool {
        self.lo == self.hi
    }

    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.lo.is_infinite() || self.hi.is_infinite()
    }

    /// Interval sum `[a.lo + b.lo, a.hi + b.hi]`.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn add(&self, other: &Interval) -> Interval {
        Interval {
            lo: self.lo + other.lo,
            hi: self.hi + other.hi,
        }
    }

    /// Interval difference `[a.lo - b.hi, a.hi - b.lo]`.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn sub(&self, other: &Interval) -> Interval {
        Interval {
            lo: self.lo - other.hi,
            hi: self.hi - other.lo,
        }
    }

    /// Translate by a scalar.
    #[inline]
    pub fn shift(&self, offset: f64) -> Interval {
        Interval {
            lo: self.lo + offset,
            hi: self.hi + offset,
        }
    }

    /// Scalar multiple `c * [lo, hi]`; endpoints swap for negative `c`.
    ///
    /// `0 * inf` is taken as `0` so that zero weights never poison a bound.
    #[inline]
    pub fn scale(&self, factor: f64) -> Interval {
        if factor == 0.0 {
            return Interval::point(0.0);
        }
        let a = factor * self.lo;
        let b = factor * self.hi;
        if factor > 0.0 {
            Interval { lo: a, hi: b }
        } else {
            Interval { lo: b, hi: a }
        }
    }

    /// Interval product: hull of the four endpoint products.
    #[allow(clippy::should_implement_trait)]
    pub fn mul(&self, other: &Interval) -> Interval {
        let products = [
            safe_mul(self.lo, other.lo),
            safe_mul(self.lo, other.hi),
            safe_mul(self.hi, other.lo),
            safe_mul(self.hi, other.hi),
        ];
        let lo = products.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = products.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Interval { lo, hi }
    }

    /// Intersect two intervals.
    #[inline]
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        if lo <= hi {
            Some(Interval { lo, hi })
        } else {
            None
        }
    }

    /// Smallest interval containing both operands.
    #[inline]
    pub fn hull(&self, other: &Interval) -> Interval {
        Interval {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }
}

#[inline]
fn safe_mul(a: f64, b: f64) -> f64 {
    if a == 0.0 || b == 0.0 {
        0.0
    } else {
        a * b
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::point(0.0)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

impl From<RangeInclusive<f64>> for Interval {
    fn from(range: RangeInclusive<f64>) -> Self {
        Self::new(*range.start(), *range.end())
    }
}

impl From<f64> for Interval {
    fn from(value: f64) -> Self {
        Self::point(value)
    }
}

impl Add for Interval {
    type Output = Interval;

    fn add(self, rhs: Interval) -> Interval {
        Interval::add(&self, &rhs)
    }
}

impl Add<f64> for Interval {
    type Output = Interval;

    fn add(self, rhs: f64) -> Interval {
        self.shift(rhs)
    }
}

impl Sub for Interval {
    type Output = Interval;

    fn sub(self, rhs: Interval) -> Interval {
        Interval::sub(&self, &rhs)
    }
}

impl Sub<f64> for Interval {
    type Output = Interval;

    fn sub(self, rhs: f64) -> Interval {
        self.shift(-rhs)
    }
}

impl Mul for Interval {
    type Output = Interval;

    fn mul(self, rhs: Interval) -> Interval {
        Interval::mul(&self, &rhs)
    }
}

impl Mul<f64> for Interval {
    type Output = Interval;

    fn mul(self, rhs: f64) -> Interval {
        self.scale(rhs)
    }
}

impl Mul<Interval> for f64 {
    type Output = Interval;

    fn mul(self, rhs: Interval) -> Interval {
        rhs.scale(self)
    }
}

impl Neg for Interval {
    type Output = Interval;

    fn neg(self) -> Interval {
        Interval {
            lo: -self.hi,
            hi: -self.lo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_interval_basic_operations() {
        let a = Interval::new(1.0, 2.0);
        let b = Interval::new(-1.0, 3.0);

        assert_eq!(a + b, Interval::new(0.0, 5.0));
        assert_eq!(a - b, Interval::new(-2.0, 3.0));
        assert_eq!(a * 2.0, Interval::new(2.0, 4.0));
        assert_eq!(-2.0 * a, Interval::new(-4.0, -2.0));
        assert_eq!(a + 1.0, Interval::new(2.0, 3.0));
        assert_eq!(a - 1.0, Interval::new(0.0, 1.0));
        assert_eq!(-a, Interval::new(-2.0, -1.0));
    }

    #[test]
    fn test_interval_product_sign_cases() {
        let pos = Interval::new(1.0, 2.0);
        let mixed = Interval::new(-1.0, 3.0);
        let neg = Interval::new(-4.0, -2.0);

        assert_eq!(pos * mixed, Interval::new(-2.0, 6.0));
        assert_eq!(pos * neg, Interval::new(-8.0, -2.0));
        assert_eq!(neg * neg, Interval::new(4.0, 16.0));
        assert_eq!(mixed * mixed, Interval::new(-3.0, 9.0));
    }

    #[test]
    fn test_scale_by_zero_ignores_infinity() {
        let unbounded = Interval::new(f64::NEG_INFINITY, f64::INFINITY);
        assert_eq!(unbounded.scale(0.0), Interval::point(0.0));
        assert_eq!(unbounded * Interval::point(0.0), Interval::point(0.0));
    }

    #[test]
    fn test_midpoint_width_radius() {
        let a = Interval::new(-1.0, 3.0);
        assert_eq!(a.midpoint(), 1.0);
        assert_eq!(a.width(), 4.0);
        assert_eq!(a.radius(), 2.0);

        let huge = Interval::new(f64::MAX, f64::MAX);
        assert_eq!(huge.midpoint(), f64::MAX);
    }

    #[test]
    fn test_contains_edge_cases() {
        let a = Interval::new(0.0, 1.0);
        assert!(a.contains(0.0));
        assert!(a.contains(1.0));
        assert!(!a.contains(-0.0001));
        assert!(!a.contains(1.0001));
        assert!(a.encloses(&Interval::new(0.25, 0.75)));
        assert!(!a.encloses(&Interval::new(0.25, 1.5)));
    }

    #[test]
    fn test_intersect_and_hull() {
        let a = Interval::new(0.0, 1.0);
        let b = Interval::new(0.5, 1.5);
        assert_eq!(a.intersect(&b), Some(Interval::new(0.5, 1.0)));
        assert_eq!(a.hull(&b), Interval::new(0.0, 1.5));
        assert!(a.intersect(&Interval::new(2.0, 3.0)).is_none());
    }

    #[test]
    fn test_centered_and_point() {
        assert_eq!(Interval::centered(6.0, 1.0), Interval::new(5.0, 7.0));
        assert!(Interval::point(2.5).is_point());
        assert_eq!(Interval::point(2.5).width(), 0.0);
    }

    #[test]
    fn test_checked_rejects_reversed_and_nan() {
        assert!(Interval::checked(1.0, 0.0).is_err());
        assert!(Interval::checked(f64::NAN, 0.0).is_err());
        assert_eq!(Interval::checked(0.0, 1.0).unwrap(), Interval::new(0.0, 1.0));
    }

    #[test]
    fn test_is_unbounded() {
        assert!(!Interval::new(-1e300, 1e300).is_unbounded());
        assert!(Interval::new(f64::NEG_INFINITY, 0.0).is_unbounded());
        assert!(Interval::new(0.0, f64::INFINITY).is_unbounded());
    }

    #[test]
    fn test_display_and_from() {
        let a: Interval = (0.5..=1.5).into();
        assert_eq!(a.to_string(), "[0.5, 1.5]");
        assert_eq!(Interval::from(2.0), Interval::point(2.0));
    }

    #[test]
    fn test_interval_serialization() {
        let a = Interval::new(-1.5, 2.5);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, r#"{"lo":-1.5,"hi":2.5}"#);
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    fn interval_strategy() -> impl Strategy<Value = Interval> {
        (-1e3..1e3f64, 0.0..1e3f64).prop_map(|(lo, w)| Interval::new(lo, lo + w))
    }

    proptest! {
        #[test]
        fn prop_operations_contain_pointwise_results(
            a in interval_strategy(),
            b in interval_strategy(),
            c in -10.0..10.0f64,
            s in 0.0..=1.0f64,
            t in 0.0..=1.0f64,
        ) {
            let x = a.lo + s * a.width();
            let y = b.lo + t * b.width();
            let tol = 1e-9 * (1.0 + x.abs() + y.abs()) * (1.0 + c.abs() + y.abs());

            let sum = a + b;
            prop_assert!(sum.lo - tol <= x + y && x + y <= sum.hi + tol);

            let diff = a - b;
            prop_assert!(diff.lo - tol <= x - y && x - y <= diff.hi + tol);

            let scaled = c * a;
            prop_assert!(scaled.lo - tol <= c * x && c * x <= scaled.hi + tol);

            let prod = a * b;
            prop_assert!(prod.lo - tol <= x * y && x * y <= prod.hi + tol);
        }

        #[test]
        fn prop_results_are_well_formed(a in interval_strategy(), b in interval_strategy(), c in -10.0..10.0f64) {
            for r in [a + b, a - b, a * c, a * b, -a] {
                prop_assert!(r.lo <= r.hi);
            }
        }
    }
}
