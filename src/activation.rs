//! Activation functions and their hand-derived local derivatives.
//!
//! The set is closed: every layer names one [`Activation`] variant, forward
//! propagation calls [`Activation::forward`] on the pre-activation `Z`, and
//! backward propagation calls [`Activation::backward`] with the cached `Z`.
//! Derivatives are always recomputed from `Z`, never from a cached `A`.
//!
//! Softmax normalises each sample independently: down the column of a 2D
//! `[classes, batch]` tensor, or along the last axis of any other rank.

use crate::tensors::Ten64;
use serde::{Deserialize, Serialize};

/// Logistic function.
#[inline]
#[must_use]
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// An activation applied to a layer's pre-activation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// `max(z, 0)`
    Relu,
    /// `1 / (1 + exp(-z))`
    Sigmoid,
    /// Hyperbolic tangent.
    Tanh,
    /// Per-sample normalised exponentials.
    Softmax,
}

impl Activation {
    /// Lowercase name, as used in layer configurations.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softmax => "softmax",
        }
    }

    /// `A = g(Z)`.
    #[must_use]
    pub fn forward(self, z: &Ten64) -> Ten64 {
        match self {
            Self::Relu => z.map(|x| x.max(0.0)),
            Self::Sigmoid => z.map(sigmoid),
            Self::Tanh => z.map(f64::tanh),
            Self::Softmax => softmax(z),
        }
    }

    /// `dZ = dA * g'(Z)`, with `g'` evaluated at the cached `Z`.
    ///
    /// `Z == 0` counts as inactive for ReLU.
    ///
    /// # Panics
    /// Panics if `da` and `z` differ in shape.
    #[must_use]
    pub fn backward(self, da: &Ten64, z: &Ten64) -> Ten64 {
        match self {
            Self::Relu => da.zip_map(z, |g, x| if x <= 0.0 { 0.0 } else { g }),
            Self::Sigmoid => da.zip_map(z, |g, x| {
                let s = sigmoid(x);
                g * s * (1.0 - s)
            }),
            Self::Tanh => da.zip_map(z, |g, x| {
                let t = x.tanh();
                g * (1.0 - t * t)
            }),
            Self::Softmax => softmax_backward(da, z),
        }
    }
}

/// Softmax grouping of a shape: `(groups, group length, element stride)`.
fn groups(shape: &[usize]) -> (usize, usize, usize) {
    if shape.len() == 2 {
        (shape[1], shape[0], shape[1])
    } else {
        let last = shape.last().copied().unwrap_or(1);
        let total: usize = shape.iter().product();
        (total / last.max(1), last, 1)
    }
}

#[inline]
fn group_index(shape: &[usize], g: usize, i: usize) -> usize {
    let (_, len, stride) = groups(shape);
    if stride == 1 { g * len + i } else { i * stride + g }
}

fn softmax(z: &Ten64) -> Ten64 {
    let (count, len, _) = groups(&z.shape);
    let mut out = vec![0.0; z.len()];
    for g in 0..count {
        let max = (0..len)
            .map(|i| z.data[group_index(&z.shape, g, i)])
            .fold(f64::NEG_INFINITY, f64::max);
        let mut total = 0.0;
        for i in 0..len {
            let idx = group_index(&z.shape, g, i);
            out[idx] = (z.data[idx] - max).exp();
            total += out[idx];
        }
        for i in 0..len {
            out[group_index(&z.shape, g, i)] /= total;
        }
    }
    Ten64::new(z.shape.clone(), out)
}

fn softmax_backward(da: &Ten64, z: &Ten64) -> Ten64 {
    assert_eq!(da.shape, z.shape, "softmax gradient shape mismatch");
    let s = softmax(z);
    let (count, len, _) = groups(&z.shape);
    let mut dz = vec![0.0; z.len()];
    for g in 0..count {
        let dot: f64 = (0..len)
            .map(|i| {
                let idx = group_index(&z.shape, g, i);
                s.data[idx] * da.data[idx]
            })
            .sum();
        for i in 0..len {
            let idx = group_index(&z.shape, g, i);
            dz[idx] = s.data[idx] * (da.data[idx] - dot);
        }
    }
    Ten64::new(z.shape.clone(), dz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor;

    #[test]
    fn relu_treats_zero_as_inactive() {
        let z = tensor!([[-1.0, 0.0, 2.0]]);
        let da = tensor!([[1.0, 1.0, 1.0]]);
        assert_eq!(Activation::Relu.backward(&da, &z).data, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn softmax_columns_sum_to_one() {
        let z = tensor!([[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);
        let a = Activation::Softmax.forward(&z);
        for col in 0..2 {
            let total: f64 = (0..3).map(|row| a.at(row, col)).sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
        assert!((a.at(0, 1) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn softmax_with_cross_entropy_seed_gives_a_minus_y() {
        let z = tensor!([[0.2], [1.4], [-0.3]]);
        let y = tensor!([[0.0], [1.0], [0.0]]);
        let a = Activation::Softmax.forward(&z);
        let da = y.div(&a).scale(-1.0);
        let dz = Activation::Softmax.backward(&da, &z);
        let expected = a.sub(&y);
        for (got, want) in dz.data.iter().zip(&expected.data) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn tanh_derivative_at_zero_is_one() {
        let z = tensor!([[0.0]]);
        let da = tensor!([[2.0]]);
        assert_eq!(Activation::Tanh.backward(&da, &z).data, vec![2.0]);
    }
}
