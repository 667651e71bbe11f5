//! Cost functions.
//!
//! `m` is the batch size, the second dimension of `Y`. Predictions are not
//! clamped: a saturated output produces `log(0)`, and the resulting non-finite
//! cost is reported as [`NumericError::NonFiniteCost`] rather than hidden.

use crate::error::NumericError;
use crate::tensors::Ten64;

/// Which cross-entropy the output layer is trained against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    /// Sigmoid output, `Y: [1, m]`.
    BinaryCrossEntropy,
    /// Softmax output, one-hot `Y: [classes, m]`.
    CategoricalCrossEntropy,
}

impl Loss {
    /// Scalar cost of `al` against `y`.
    ///
    /// # Errors
    /// [`NumericError::NonFiniteCost`] if the cost is `NaN` or infinite.
    pub fn cost(self, al: &Ten64, y: &Ten64) -> Result<f64, NumericError> {
        match self {
            Self::BinaryCrossEntropy => compute_cost(al, y),
            Self::CategoricalCrossEntropy => compute_categorical_cost(al, y),
        }
    }

    /// `dAL`, the derivative of the cost with respect to the network output.
    ///
    /// Binary: `-(Y/AL - (1-Y)/(1-AL))`. Categorical: `-Y/AL`, zero where
    /// `Y == 0` so an underflowed `AL` does not poison the softmax backward.
    #[must_use]
    pub fn seed(self, al: &Ten64, y: &Ten64) -> Ten64 {
        match self {
            Self::BinaryCrossEntropy => al.zip_map(y, |a, t| -(t / a - (1.0 - t) / (1.0 - a))),
            Self::CategoricalCrossEntropy => {
                al.zip_map(y, |a, t| if t == 0.0 { 0.0 } else { -(t / a) })
            }
        }
    }
}

/// Binary cross-entropy: `-(1/m) * sum(Y*log(AL) + (1-Y)*log(1-AL))`.
///
/// # Errors
/// [`NumericError::NonFiniteCost`] if the cost is `NaN` or infinite.
///
/// # Panics
/// Panics if `al` and `y` differ in shape.
pub fn compute_cost(al: &Ten64, y: &Ten64) -> Result<f64, NumericError> {
    let m = y.cols() as f64;
    let total = al
        .zip_map(y, |a, t| t * a.ln() + (1.0 - t) * (1.0 - a).ln())
        .sum();
    finite(-total / m)
}

/// Softmax cross-entropy: `-(1/m) * sum(Y*log(AL))`.
///
/// Entries where `Y == 0` contribute nothing, even when `AL` underflowed to 0.
///
/// # Errors
/// [`NumericError::NonFiniteCost`] if the cost is `NaN` or infinite.
pub fn compute_categorical_cost(al: &Ten64, y: &Ten64) -> Result<f64, NumericError> {
    let m = y.cols() as f64;
    let total = al
        .zip_map(y, |a, t| if t == 0.0 { 0.0 } else { t * a.ln() })
        .sum();
    finite(-total / m)
}

fn finite(cost: f64) -> Result<f64, NumericError> {
    if cost.is_finite() {
        Ok(cost)
    } else {
        Err(NumericError::NonFiniteCost)
    }
}

/// Percentage of samples whose prediction matches the label.
///
/// Binary outputs are thresholded at `0.5`; multiclass outputs compare argmax.
#[must_use]
pub fn accuracy(loss: Loss, al: &Ten64, y: &Ten64) -> f64 {
    let m = y.cols();
    if m == 0 {
        return 0.0;
    }
    let correct = (0..m)
        .filter(|&col| match loss {
            Loss::BinaryCrossEntropy => (al.at(0, col) > 0.5) == (y.at(0, col) > 0.5),
            Loss::CategoricalCrossEntropy => al.argmax_column(col) == y.argmax_column(col),
        })
        .count();
    100.0 * correct as f64 / m as f64
}
