//! Approximate equality of floating point values and tensors.
//!
//! Comparisons are graded instead of boolean: a pair of values is
//! [`Precise`](ApproxEquality::Precise), [`Partial`](ApproxEquality::Partial),
//! [`Relative`](ApproxEquality::Relative) or [`Scarce`](ApproxEquality::Scarce)
//! depending on the absolute difference, and a collection is graded by its
//! worst element.

use crate::tensors::Ten64;

/// The max epsilon accepted on `f64`s.
pub const F64_MAX_ERROR: f64 = 1e-3;

/// The expected minimum epsilon accepted on `f64`s.
pub const F64_AVG_ERROR: f64 = 1e-6;

/// The best expected epsilon accepted on `f64`s.
pub const F64_MIN_ERROR: f64 = 1e-13;

/// The approximated equality enumerated, best first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,
    /// Good epsilon.
    Partial = 1,
    /// Acceptable epsilon.
    Relative = 2,
    /// No relative equality.
    Scarce = 3,
}

impl ApproxEquality {
    /// Whether `self` is at least as good as `grade`.
    #[must_use]
    pub fn within(self, grade: Self) -> bool {
        self <= grade
    }
}

/// Grades how close `self` is to `rhs`.
pub trait RelativeEq<Rhs: ?Sized> {
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

impl RelativeEq<Self> for f64 {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        let dif = (self - rhs).abs();

        if dif < F64_MIN_ERROR {
            ApproxEquality::Precise
        } else if dif < F64_AVG_ERROR {
            ApproxEquality::Partial
        } else if dif < F64_MAX_ERROR {
            ApproxEquality::Relative
        } else {
            ApproxEquality::Scarce
        }
    }
}

impl<T: RelativeEq<U>, U> RelativeEq<[U]> for [T] {
    fn approx_eq(&self, rhs: &[U]) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        let mut eq = ApproxEquality::Precise;
        for (t_val, u_val) in self.iter().zip(rhs) {
            eq = eq.max(t_val.approx_eq(u_val));
            if eq == ApproxEquality::Scarce {
                break;
            }
        }
        eq
    }
}

impl RelativeEq<Self> for Ten64 {
    /// Tensors of different shapes are [`ApproxEquality::Scarce`].
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        if self.shape != rhs.shape {
            return ApproxEquality::Scarce;
        }
        self.data.as_slice().approx_eq(rhs.data.as_slice())
    }
}

/// Whether `a` and `b` agree to within [`F64_AVG_ERROR`].
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b).within(ApproxEquality::Partial)
}

/// `‖a − b‖ / (‖a‖ + ‖b‖)`, `0` when both are zero.
///
/// # Panics
/// Panics if the lengths differ.
#[must_use]
pub fn relative_difference(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "relative difference of unequal lengths");
    let diff = l2(a.iter().zip(b).map(|(x, y)| x - y));
    let scale = l2(a.iter().copied()) + l2(b.iter().copied());
    if scale == 0.0 { 0.0 } else { diff / scale }
}

fn l2(values: impl Iterator<Item = f64>) -> f64 {
    values.map(|x| x * x).sum::<f64>().sqrt()
}
